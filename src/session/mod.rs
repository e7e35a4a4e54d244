//! Chat sessions and their append-only message logs.

mod models;
mod repository;
mod service;

pub use models::{
    ChatMessage, ChatSession, CreateSessionRequest, MessageRole, SessionDetail,
    UpdateSessionRequest,
};
pub use repository::SessionRepository;
pub use service::{DEFAULT_SESSION_TITLE, SessionService};
