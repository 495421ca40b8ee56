//! Undo/redo history of a flow's structure.

mod recorder;
mod store;

pub use recorder::HistoryRecorder;
pub use store::{HistoryState, HistoryStore, SaveOutcome, signature};
