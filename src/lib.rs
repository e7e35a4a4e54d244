//! Streaming AI chat backend with pluggable model providers.
//!
//! Authenticated users hold chat sessions whose prompts fan out to one of
//! several upstream text-generation backends; model output streams back
//! token-by-token over SSE while the full exchange is recorded durably.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod provider;
pub mod session;
pub mod user;
