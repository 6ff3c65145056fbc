//! Solfa workflows
//!
//! - **StreamSession**: per-connection chunk loop with an evolving key estimate
//! - **BatchPipeline**: whole-file run with one key and one rendered artifact

pub mod batch_pipeline;
pub mod stream_session;

pub use batch_pipeline::{collapse_repeats, BatchConfig, BatchError, BatchOutcome, BatchPipeline};
pub use stream_session::{
    ChunkTransport, Inbound, KeyView, NoteView, ResultFrame, SessionState, SessionSummary,
    StreamSession, TransportError,
};
