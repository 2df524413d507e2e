use log::{debug, info};

use crate::cloud::endpoint::{CompletedPart, ObjectRef, Session, StorageEndpoint, UploadError};
use crate::upload::error::PipelineError;

/// Orders acknowledged parts and issues the finalize request.
pub struct CompletionAssembler;

impl CompletionAssembler {
    /// Sort acknowledged parts by part number and check they cover `1..=expected`.
    ///
    /// The store concatenates parts in the order named here, so arrival order
    /// must never leak into the finalize request.
    pub fn assemble(
        mut parts: Vec<CompletedPart>,
        expected: u32,
    ) -> Result<Vec<CompletedPart>, PipelineError> {
        parts.sort_by_key(|part| part.part_number);

        let dense = parts.len() == expected as usize
            && parts
                .iter()
                .zip(1..=expected)
                .all(|(part, number)| part.part_number == number);

        if !dense {
            return Err(PipelineError::MissingParts {
                expected,
                acknowledged: parts.iter().map(|part| part.part_number).collect(),
            });
        }

        Ok(parts)
    }

    /// Send the ordered part list to the store.
    pub async fn finalize<E: StorageEndpoint + ?Sized>(
        endpoint: &E,
        session: &Session,
        parts: &[CompletedPart],
    ) -> Result<ObjectRef, UploadError> {
        debug!(
            "Completing multipart upload {} with {} parts",
            session.upload_id,
            parts.len()
        );
        let object = endpoint.complete_session(session, parts).await?;
        info!("Completed multipart upload for {}", session.destination);
        Ok(object)
    }
}
