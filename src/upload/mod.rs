//! Streaming chunked upload pipeline.
//!
//! Bytes arrive from a producer as [`sink::StreamEvent`]s, are cut into
//! numbered parts by the [`part_buffer::PartBuffer`], uploaded concurrently
//! by the [`coordinator::UploadCoordinator`] under a bounded worker pool,
//! retried with backoff by the [`retry::RetryEngine`], and finalized in part
//! number order by the [`assembler::CompletionAssembler`] once the stream is
//! complete. The [`session::SessionManager`] guarantees the remote session is
//! ended exactly once, by a finalize or an abort.
//!
//! ```text
//! producer ──▶ ArchiveSink ══channel══▶ PartBuffer ──▶ UploadCoordinator ──▶ N upload tasks
//!                                                          ▲        │
//!                                                          │   outcomes (JoinSet)
//!                                                   RetryEngine ◀───┤
//!                                                                   ▼
//!                                         CompletionAssembler ──▶ SessionManager::complete
//! ```

pub mod assembler;
pub mod coordinator;
pub mod error;
pub mod part;
pub mod part_buffer;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod session;
pub mod sink;

pub use error::PipelineError;
pub use pipeline::{PipelineConfig, UploadPipeline, UploadReport};
pub use retry::RetryPolicy;
pub use sink::{stream_channel, ArchiveSink, StreamEvent};
