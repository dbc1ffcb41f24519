//! Revision accumulation, classification and implicit-action inference

mod assembler;
mod file_history;
mod inference;

pub use assembler::{AssemblyStats, HistoryAssembler};
pub use file_history::FileHistory;
pub use inference::{path_prefix_cmp, ImplicitActionInferencer, InferenceStats};
