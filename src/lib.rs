//! Durable case lifecycle engine for chat-originated clinical triage.

pub mod auth;
pub mod chat;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod intake;
pub mod llm;
pub mod logging;
pub mod monitoring;
pub mod pdf;
pub mod store;
pub mod summary;
pub mod worker;
