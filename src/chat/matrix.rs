//! Matrix Client-Server API adapter: the concrete `ChatGateway` wired into
//! every process entrypoint. HTTP only — no SDK, matching the approach the
//! LLM provider client (`llm::OpenAiLlmClient`) already takes for its
//! external collaborator.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::chat::gateway::{ChatGateway, ChatGatewayError};

pub struct MatrixChatGateway {
    http: reqwest::Client,
    homeserver_url: String,
    access_token: String,
}

impl MatrixChatGateway {
    pub fn new(homeserver_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            homeserver_url: homeserver_url.into(),
            access_token: access_token.into(),
        }
    }

    fn txn_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn parse_mxc_uri(uri: &str) -> Result<(&str, &str), ChatGatewayError> {
        let without_scheme = uri
            .strip_prefix("mxc://")
            .ok_or_else(|| ChatGatewayError::Download(format!("not an mxc:// uri: {uri}")))?;
        without_scheme
            .split_once('/')
            .filter(|(server, media_id)| !server.is_empty() && !media_id.is_empty())
            .ok_or_else(|| ChatGatewayError::Download(format!("malformed mxc:// uri: {uri}")))
    }

    async fn send_message(
        &self,
        room_id: &str,
        content: Value,
    ) -> Result<String, ChatGatewayError> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.homeserver_url,
            urlencoding::encode(room_id),
            Self::txn_id(),
        );
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&content)
            .send()
            .await
            .map_err(|e| ChatGatewayError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChatGatewayError::Request(e.to_string()))?;
        let body: Value = response.json().await.map_err(|e| ChatGatewayError::Request(e.to_string()))?;
        body.get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatGatewayError::Request("response missing event_id".to_string()))
    }
}

#[async_trait]
impl ChatGateway for MatrixChatGateway {
    async fn post_text(&self, room_id: &str, body: &str) -> Result<String, ChatGatewayError> {
        self.send_message(room_id, json!({"msgtype": "m.text", "body": body})).await
    }

    async fn reply_text(
        &self,
        room_id: &str,
        parent_event_id: &str,
        body: &str,
    ) -> Result<String, ChatGatewayError> {
        self.send_message(
            room_id,
            json!({
                "msgtype": "m.text",
                "body": body,
                "m.relates_to": {"m.in_reply_to": {"event_id": parent_event_id}},
            }),
        )
        .await
    }

    async fn redact_event(&self, room_id: &str, event_id: &str) -> Result<(), ChatGatewayError> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/redact/{}/{}",
            self.homeserver_url,
            urlencoding::encode(room_id),
            urlencoding::encode(event_id),
            Self::txn_id(),
        );
        self.http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ChatGatewayError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChatGatewayError::Request(e.to_string()))?;
        Ok(())
    }

    async fn download_media(&self, uri: &str) -> Result<Vec<u8>, ChatGatewayError> {
        let (server_name, media_id) = Self::parse_mxc_uri(uri)?;
        let url = format!(
            "{}/_matrix/client/v1/media/download/{}/{}",
            self.homeserver_url,
            urlencoding::encode(server_name),
            urlencoding::encode(media_id),
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ChatGatewayError::Download(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChatGatewayError::Download(e.to_string()))?;
        let bytes = response.bytes().await.map_err(|e| ChatGatewayError::Download(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ChatGatewayError::Download(format!("empty media body for {uri}")));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_mxc_uri() {
        let (server, media_id) = MatrixChatGateway::parse_mxc_uri("mxc://example.org/abc123").unwrap();
        assert_eq!(server, "example.org");
        assert_eq!(media_id, "abc123");
    }

    #[test]
    fn rejects_a_uri_without_the_mxc_scheme() {
        let err = MatrixChatGateway::parse_mxc_uri("https://example.org/abc123").unwrap_err();
        assert!(matches!(err, ChatGatewayError::Download(_)));
    }

    #[test]
    fn rejects_a_uri_missing_the_media_id() {
        let err = MatrixChatGateway::parse_mxc_uri("mxc://example.org/").unwrap_err();
        assert!(matches!(err, ChatGatewayError::Download(_)));
    }

    #[test]
    fn rejects_a_uri_missing_the_server_name() {
        let err = MatrixChatGateway::parse_mxc_uri("mxc:///abc123").unwrap_err();
        assert!(matches!(err, ChatGatewayError::Download(_)));
    }
}
