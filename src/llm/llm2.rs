//! LLM2 suggestion: accept/deny plus support-flag recommendation derived from
//! the LLM1 structured extraction.
//!
//! No upstream service module backs this one; it is structurally grounded on
//! `Llm1Service` (same client-call/parse/validate shape) and on the
//! `suggested_action` fields spec.md describes for this step.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::llm::client::LlmClientPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Llm2Decision {
    Accept,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Llm2SupportFlag {
    None,
    Anesthesist,
    AnesthesistIcu,
}

/// Suggestion payload: the LLM's recommendation, not the doctor's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm2Response {
    pub suggested_decision: Llm2Decision,
    pub suggested_support_flag: Llm2SupportFlag,
    pub rationale: String,
    pub confidence: String,
}

impl Llm2Response {
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.suggested_decision, Llm2Decision::Deny)
            && !matches!(self.suggested_support_flag, Llm2SupportFlag::None)
        {
            return Err("a deny suggestion must carry support_flag none".to_string());
        }
        if self.rationale.trim().is_empty() {
            return Err("rationale must not be empty".to_string());
        }
        Ok(())
    }
}

pub struct Llm2ServiceResult {
    pub structured_data: serde_json::Value,
    pub suggested_decision: Llm2Decision,
    pub suggested_support_flag: Llm2SupportFlag,
}

pub struct Llm2Service {
    llm_client: Arc<dyn LlmClientPort>,
}

impl Llm2Service {
    pub fn new(llm_client: Arc<dyn LlmClientPort>) -> Self {
        Self { llm_client }
    }

    pub async fn run(
        &self,
        case_id: Uuid,
        llm1_structured_data: &serde_json::Value,
    ) -> Result<Llm2ServiceResult, HandlerError> {
        let system_prompt = render_system_prompt();
        let user_prompt = render_user_prompt(case_id, llm1_structured_data);

        let raw_response = self
            .llm_client
            .complete(&system_prompt, &user_prompt)
            .await
            .map_err(|e| HandlerError::retriable(crate::error::HandlerCause::Llm2, e.to_string()))?;

        let validated: Llm2Response = serde_json::from_str(&raw_response).map_err(|e| {
            HandlerError::retriable(
                crate::error::HandlerCause::Llm2,
                format!("LLM2 returned non-conforming payload: {e}"),
            )
        })?;

        validated
            .validate()
            .map_err(|e| HandlerError::retriable(crate::error::HandlerCause::Llm2, e))?;

        let structured_data = serde_json::to_value(&validated)
            .map_err(|e| HandlerError::retriable(crate::error::HandlerCause::Llm2, e.to_string()))?;

        Ok(Llm2ServiceResult {
            structured_data,
            suggested_decision: validated.suggested_decision,
            suggested_support_flag: validated.suggested_support_flag,
        })
    }
}

fn render_system_prompt() -> String {
    "Voce e um assistente clinico que sugere aceitar ou negar um pedido de \
     Endoscopia Digestiva Alta (EDA) com base em dados ja estruturados, alem de \
     recomendar suporte de anestesista quando aplicavel. Responda apenas com JSON \
     valido, em pt-BR. A decisao final e sempre do medico responsavel."
        .to_string()
}

fn render_user_prompt(case_id: Uuid, llm1_structured_data: &serde_json::Value) -> String {
    format!(
        "Tarefa: sugerir decisao (accept|deny) e suporte (none|anesthesist|anesthesist_icu) \
         a partir dos dados estruturados abaixo.\n\ncase_id: {case_id}\n\n\
         Dados estruturados (schema v1.1):\n{llm1_structured_data}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_consistent_accept_suggestion() {
        let payload = Llm2Response {
            suggested_decision: Llm2Decision::Accept,
            suggested_support_flag: Llm2SupportFlag::Anesthesist,
            rationale: "risco cardiovascular moderado".to_string(),
            confidence: "media".to_string(),
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn rejects_deny_with_nonempty_support_flag() {
        let payload = Llm2Response {
            suggested_decision: Llm2Decision::Deny,
            suggested_support_flag: Llm2SupportFlag::AnesthesistIcu,
            rationale: "fora do escopo EDA".to_string(),
            confidence: "alta".to_string(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn rejects_empty_rationale() {
        let payload = Llm2Response {
            suggested_decision: Llm2Decision::Accept,
            suggested_support_flag: Llm2SupportFlag::None,
            rationale: "   ".to_string(),
            confidence: "media".to_string(),
        };
        assert!(payload.validate().is_err());
    }
}
