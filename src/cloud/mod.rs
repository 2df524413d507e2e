//! Cloud storage integration.
//!
//! The upload pipeline talks to storage only through [`endpoint::StorageEndpoint`];
//! the archive job reads its inputs through [`lister::ObjectLister`] and
//! [`source::ObjectSource`]. [`s3::S3Storage`] implements all three on top of
//! rusoto.
//!
//! ```text
//!  ┌──────────────┐  keys   ┌──────────────┐ bytes ┌─────────────────┐
//!  │ ObjectLister │────────▶│ Archive job  │──────▶│ Upload pipeline │
//!  └──────────────┘         │ (ZIP writer) │       └────────┬────────┘
//!  ┌──────────────┐ bodies  │              │                │ parts
//!  │ ObjectSource │────────▶│              │       ┌────────▼────────┐
//!  └──────────────┘         └──────────────┘       │ StorageEndpoint │
//!                                                  └─────────────────┘
//! ```

/// S3 client construction
pub mod client;

/// Storage endpoint contract and error taxonomy
pub mod endpoint;

/// Paginated source listing
pub mod lister;

/// Source object access
pub mod source;

/// rusoto-backed implementations
pub mod s3;
