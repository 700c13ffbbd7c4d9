//! Inbound chat-gateway webhook (C5/C6 trigger surface): the bridge process
//! fronting the homeserver posts batches of room events here instead of us
//! long-polling a sync endpoint, mirroring the teacher's `WebhookServer`
//! push-delivery shape for external channels.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::chat::{parse_matrix_reaction_event, parse_room1_pdf_intake_event, parse_room3_reply_event};
use crate::error::ApiError;
use crate::intake::Room1IntakeService;
use crate::store::JournalStore;
use crate::worker::WorkerHandlers;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookState {
    pub intake: Arc<Room1IntakeService>,
    pub worker: Arc<WorkerHandlers>,
    pub journal: Arc<dyn JournalStore>,
    pub bot_user_id: String,
    pub room1_id: String,
    pub room2_id: String,
    pub room3_id: String,
    pub hmac_secret: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    room_id: String,
    events: Vec<Value>,
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let header_value = headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing X-Signature header".to_string()))?;
    let signature = hex::decode(header_value)
        .map_err(|_| ApiError::BadRequest("X-Signature is not valid hex".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Internal(format!("invalid hmac key: {e}")))?;
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| ApiError::BadRequest("signature mismatch".to_string()))
}

pub async fn receive_events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    verify_signature(&state.hmac_secret, &headers, &body)?;

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid webhook payload: {e}")))?;

    for event in &payload.events {
        if let Err(err) = dispatch_event(&state, &payload.room_id, event).await {
            warn!(room_id = %payload.room_id, error = %err, "webhook_event_dispatch_failed");
            return Err(ApiError::Internal(err.to_string()));
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn dispatch_event(state: &WebhookState, room_id: &str, event: &Value) -> Result<(), ApiError> {
    if let Some(reaction) = parse_matrix_reaction_event(room_id, event, &state.bot_user_id) {
        let Some(case_id) = state
            .journal
            .get_case_id_by_message_ref(room_id, &reaction.related_event_id)
            .await?
        else {
            info!(room_id, target = %reaction.related_event_id, "webhook_reaction_unresolved_case");
            return Ok(());
        };
        state.worker.handle_positive_reaction(case_id, &reaction).await.map_err(|e| ApiError::Internal(e.to_string()))?;
        return Ok(());
    }

    if room_id == state.room1_id {
        if let Some(parsed) = parse_room1_pdf_intake_event(room_id, event, &state.bot_user_id) {
            state.intake.ingest_pdf_event(&parsed).await?;
        }
        return Ok(());
    }

    if room_id == state.room2_id || room_id == state.room3_id {
        let Some(reply) = parse_room3_reply_event(room_id, event, &state.bot_user_id) else {
            return Ok(());
        };
        let Some(case_id) = state
            .journal
            .get_case_id_by_message_ref(room_id, &reply.reply_to_event_id)
            .await?
        else {
            info!(room_id, target = %reply.reply_to_event_id, "webhook_reply_unresolved_case");
            return Ok(());
        };

        let outcome = if room_id == state.room2_id {
            state.worker.handle_doctor_reply(case_id, &reply.body).await
        } else {
            state.worker.handle_scheduler_reply(case_id, &reply.body).await
        };
        outcome.map_err(|e| ApiError::Internal(e.to_string()))?;
    }

    Ok(())
}

pub fn router(state: WebhookState) -> axum::Router {
    axum::Router::new()
        .route("/webhook/events", axum::routing::post(receive_events))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());
        let mut headers = HeaderMap::new();
        headers.insert("X-Signature", HeaderValue::from_str(&signature).unwrap());
        headers
    }

    #[test]
    fn accepts_a_correctly_signed_body() {
        let body = br#"{"room_id": "!r1", "events": []}"#;
        let headers = signed_headers("secret", body);
        assert!(verify_signature("secret", &headers, body).is_ok());
    }

    #[test]
    fn rejects_a_body_signed_with_the_wrong_secret() {
        let body = br#"{"room_id": "!r1", "events": []}"#;
        let headers = signed_headers("wrong-secret", body);
        assert!(verify_signature("secret", &headers, body).is_err());
    }

    #[test]
    fn rejects_a_tampered_body() {
        let body = br#"{"room_id": "!r1", "events": []}"#;
        let headers = signed_headers("secret", body);
        let tampered = br#"{"room_id": "!r2", "events": []}"#;
        assert!(verify_signature("secret", &headers, tampered).is_err());
    }

    #[test]
    fn rejects_a_missing_signature_header() {
        let body = br#"{"room_id": "!r1", "events": []}"#;
        assert!(verify_signature("secret", &HeaderMap::new(), body).is_err());
    }
}
