use std::sync::Arc;

use log::{debug, info, warn};

use crate::cloud::endpoint::{
    CompletedPart, Destination, ObjectRef, Session, StorageEndpoint, UploadError,
};
use crate::upload::assembler::CompletionAssembler;
use crate::upload::error::PipelineError;

/// Lifecycle of one chunked-upload session.
///
/// ```text
/// Created ──▶ Uploading ──▶ Completing ──▶ Completed
///    │            │              │
///    └────────────┴──────────────┴──────▶ Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Uploading,
    Completing,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Created, Uploading) | (Uploading, Completing) | (Completing, Completed) => true,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Owns the session: opens it, threads its token to uploads, and ends it
/// exactly once with either a finalize or an abort.
pub struct SessionManager<E: StorageEndpoint> {
    endpoint: Arc<E>,
    session: Arc<Session>,
    state: SessionState,
}

impl<E: StorageEndpoint> SessionManager<E> {
    /// Create the remote session. Must succeed before any part is uploaded.
    pub async fn open(
        endpoint: Arc<E>,
        destination: Destination,
    ) -> Result<Self, PipelineError> {
        let upload_id = endpoint
            .create_session(&destination)
            .await
            .map_err(PipelineError::SessionOpen)?;

        info!("Opened upload session for {}", destination);
        Ok(Self {
            endpoint,
            session: Arc::new(Session {
                destination,
                upload_id,
            }),
            state: SessionState::Created,
        })
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Called on every dispatch; only the first one changes state.
    pub fn mark_uploading(&mut self) -> Result<(), PipelineError> {
        if self.state == SessionState::Uploading {
            return Ok(());
        }
        self.transition(SessionState::Uploading)
    }

    /// Finalize with the acknowledged parts. On failure the session is aborted.
    pub async fn complete(
        &mut self,
        parts: Vec<CompletedPart>,
        expected: u32,
    ) -> Result<ObjectRef, PipelineError> {
        self.transition(SessionState::Completing)?;

        let parts = match CompletionAssembler::assemble(parts, expected) {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_quietly().await;
                return Err(e);
            }
        };

        match CompletionAssembler::finalize(self.endpoint.as_ref(), &self.session, &parts).await {
            Ok(object) => {
                self.transition(SessionState::Completed)?;
                Ok(object)
            }
            Err(e) => {
                self.abort_quietly().await;
                Err(PipelineError::Finalize(e))
            }
        }
    }

    /// Release the session on the server. No-op once terminal.
    pub async fn abort(&mut self) -> Result<(), UploadError> {
        if self.state.is_terminal() {
            debug!(
                "Session {} already {:?}, not aborting",
                self.session.upload_id, self.state
            );
            return Ok(());
        }
        // The session is dead whether or not the abort call gets through
        self.state = SessionState::Aborted;
        warn!("Aborting upload session for {}", self.session.destination);
        self.endpoint.abort_session(&self.session).await
    }

    pub(crate) async fn abort_quietly(&mut self) {
        match self.abort().await {
            Ok(()) => warn!("Successfully aborted the failed upload"),
            Err(e) => warn!("Failed to abort upload: {}", e),
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Session {}: {:?} -> {:?}", self.session.upload_id, self.state, next);
        self.state = next;
        Ok(())
    }
}
