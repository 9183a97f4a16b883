//! Typed-data capture pipelines with progress and cancellation.
//!
//! Captured data (images, text, links, raw bytes) flows through composable
//! [`Stage`]s: [`ProcessorChain`]s run stages in sequence and split the
//! progress bar by their time estimates, [`DataRouter`]s dispatch on the
//! data's type tag. A [`CommandTask`] runs a source-rooted pipeline on a
//! worker thread, and [`CommandRunner`] starts tasks and fans their events
//! out to subscribers.

pub mod cancel;
pub mod chain;
pub mod config;
pub mod data;
pub mod error;
pub mod estimate;
pub mod progress;
pub mod router;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod task;

pub use cancel::CancelToken;
pub use chain::{CommandChain, ProcessorChain};
pub use config::Config;
pub use data::{DataType, Payload, TypeSet, TypedData};
pub use error::{PipelineError, Result};
pub use estimate::TimeEstimate;
pub use progress::aggregate::AggregateProgressTracker;
pub use progress::{ProgressEvent, ProgressTracker, ProgressView};
pub use router::DataRouter;
pub use runner::{CommandRunner, RunnerEvent};
pub use stage::{Capabilities, SharedStage, Stage, StageHandle, StageRegistry};
pub use task::{CommandCanceled, CommandTask, TaskEvent, TaskId, TaskState};
