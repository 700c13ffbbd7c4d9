//! Port consumed by Intake/Worker/Summary to reach the chat protocol adapter.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChatGatewayError {
    #[error("chat gateway request failed: {0}")]
    Request(String),
    #[error("media download failed: {0}")]
    Download(String),
}

/// Minimal surface this crate needs from a chat protocol adapter. The
/// concrete adapter (`chat::matrix::MatrixChatGateway`) lives behind this
/// trait so worker/intake/summary code stays protocol-agnostic.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn post_text(&self, room_id: &str, body: &str) -> Result<String, ChatGatewayError>;

    async fn reply_text(
        &self,
        room_id: &str,
        parent_event_id: &str,
        body: &str,
    ) -> Result<String, ChatGatewayError>;

    async fn redact_event(&self, room_id: &str, event_id: &str) -> Result<(), ChatGatewayError>;

    /// Downloads the bytes behind an `mxc://` (or equivalent) media URI.
    /// Empty bytes are treated as a download failure by callers.
    async fn download_media(&self, uri: &str) -> Result<Vec<u8>, ChatGatewayError>;
}
