//! Streaming chat core: history assembly and turn orchestration.

mod history;
mod orchestrator;

pub use history::HistoryAssembler;
pub use orchestrator::{
    ChatTurnRequest, DEFAULT_PACING, StreamEvent, StreamOrchestrator, StreamOutcome,
};
