//! Bounded concurrent pipelines: sources, transforms and a fan-in combiner
//! connected by completable sequences.
//!
//! Every stage runs as one tokio task and returns its output [`Sequence`]
//! together with a handle that can stop or join it. Sequences are rendezvous
//! by default, so a producer waits until its item has been taken.

pub mod config;
pub mod error;
pub mod handle;
pub mod latch;
pub mod merge;
pub mod pipeline;
pub mod sequence;
pub mod source;
pub mod transform;

pub use config::StageOptions;
pub use error::{PipeError, PipeResult};
pub use handle::StageHandle;
pub use latch::{Countdown, CountdownGuard};
pub use merge::{MergeHandle, MergeState, SlotState, merge, merge_with};
pub use pipeline::Pipeline;
pub use sequence::{Inlet, Sequence, SequenceSender, SharedSequence, channel};
pub use source::{source, source_with};
pub use transform::{fan_out, transform, transform_with, try_transform, try_transform_with};
