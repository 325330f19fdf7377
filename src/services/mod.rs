//! Server-side chunk persistence and merge protocol.

pub mod chunk_store;
pub mod layout;
pub mod merge_engine;
pub mod upload_coordinator;
pub mod upload_service;
pub mod verification_service;

pub use chunk_store::{ChunkStore, StagedChunk};
pub use layout::StorageLayout;
pub use merge_engine::{MergeEngine, MergeOutcome};
pub use upload_coordinator::{Ack, UploadCoordinator};
pub use upload_service::{UploadError, UploadResult, UploadService};
pub use verification_service::{VerificationService, VerifyResult};
