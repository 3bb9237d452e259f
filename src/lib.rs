//! Campus Desk: complaint tracking for a university campus, with real-time
//! and email notifications and a document-grounded assistant.

pub mod access;
pub mod auth;
pub mod chat;
pub mod config;
pub mod embed;
pub mod error;
pub mod http;
pub mod knowledge;
pub mod lifecycle;
pub mod llm;
pub mod logger;
pub mod notify;
pub mod runtime;
pub mod store;
pub mod vector;
