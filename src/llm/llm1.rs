//! LLM1 structured extraction: schema v1.1 validation and orchestration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::error::HandlerError;
use crate::llm::client::LlmClientPort;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Patient {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub sex: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1RequestedProcedure {
    pub name: Option<String>,
    pub urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Labs {
    pub hb_g_dl: Option<f64>,
    pub platelets_per_mm3: Option<i64>,
    pub inr: Option<f64>,
    pub source_text_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Ecg {
    pub report_present: String,
    pub abnormal_flag: String,
    pub source_text_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Asa {
    #[serde(rename = "class")]
    pub class_grade: String,
    pub confidence: String,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1CardiovascularRisk {
    pub level: String,
    pub confidence: String,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Eda {
    pub indication_category: String,
    pub exclusion_type: String,
    pub is_pediatric: bool,
    pub foreign_body_suspected: bool,
    pub requested_procedure: Llm1RequestedProcedure,
    pub labs: Llm1Labs,
    pub ecg: Llm1Ecg,
    pub asa: Llm1Asa,
    pub cardiovascular_risk: Llm1CardiovascularRisk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1PolicyPrecheck {
    pub excluded_from_eda_flow: bool,
    pub exclusion_reason: Option<String>,
    pub labs_required: bool,
    pub labs_pass: String,
    pub labs_failed_items: Vec<String>,
    pub ecg_required: bool,
    pub ecg_present: String,
    pub pediatric_flag: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Summary {
    pub one_liner: String,
    pub bullet_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1ExtractionQuality {
    pub confidence: String,
    pub missing_fields: Vec<String>,
    pub notes: Option<String>,
}

/// Structured extraction payload, schema v1.1. `serde(deny_unknown_fields)`
/// gives the "extra=forbid" strictness; the regex/range/length constraints
/// the type system can't express are checked in `validate()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Llm1Response {
    pub schema_version: String,
    pub language: String,
    pub agency_record_number: String,
    pub patient: Llm1Patient,
    pub eda: Llm1Eda,
    pub policy_precheck: Llm1PolicyPrecheck,
    pub summary: Llm1Summary,
    pub extraction_quality: Llm1ExtractionQuality,
}

fn agency_record_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{5}$").unwrap())
}

impl Llm1Response {
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != "1.1" {
            return Err(format!("unsupported schema_version: {}", self.schema_version));
        }
        if self.language != "pt-BR" {
            return Err(format!("unsupported language: {}", self.language));
        }
        if !agency_record_pattern().is_match(&self.agency_record_number) {
            return Err("agency_record_number must be exactly 5 digits".to_string());
        }
        if let Some(age) = self.patient.age {
            if !(0..=130).contains(&age) {
                return Err("patient.age must be between 0 and 130".to_string());
            }
        }
        if let Some(sex) = &self.patient.sex {
            if !matches!(sex.as_str(), "M" | "F" | "Outro") {
                return Err(format!("invalid patient.sex: {sex}"));
            }
        }
        let bullets = self.summary.bullet_points.len();
        if !(3..=8).contains(&bullets) {
            return Err("summary.bullet_points must have between 3 and 8 items".to_string());
        }
        Ok(())
    }
}

pub struct Llm1ServiceResult {
    pub structured_data: serde_json::Value,
    pub summary_text: String,
}

pub struct Llm1Service {
    llm_client: Arc<dyn LlmClientPort>,
}

impl Llm1Service {
    pub fn new(llm_client: Arc<dyn LlmClientPort>) -> Self {
        Self { llm_client }
    }

    pub async fn run(
        &self,
        case_id: Uuid,
        agency_record_number: &str,
        clean_text: &str,
    ) -> Result<Llm1ServiceResult, HandlerError> {
        let system_prompt = render_system_prompt();
        let user_prompt = render_user_prompt(case_id, agency_record_number, clean_text);

        let raw_response = self
            .llm_client
            .complete(&system_prompt, &user_prompt)
            .await
            .map_err(|e| HandlerError::retriable(crate::error::HandlerCause::Llm1, e.to_string()))?;

        let validated: Llm1Response = serde_json::from_str(&raw_response).map_err(|e| {
            HandlerError::retriable(
                crate::error::HandlerCause::Llm1,
                format!("LLM1 returned non-conforming payload: {e}"),
            )
        })?;

        validated
            .validate()
            .map_err(|e| HandlerError::retriable(crate::error::HandlerCause::Llm1, e))?;

        if validated.agency_record_number != agency_record_number {
            return Err(HandlerError::retriable(
                crate::error::HandlerCause::Llm1,
                "LLM1 agency_record_number mismatch",
            ));
        }

        let summary_text = validated.summary.one_liner.clone();
        let structured_data = serde_json::to_value(&validated)
            .map_err(|e| HandlerError::retriable(crate::error::HandlerCause::Llm1, e.to_string()))?;

        Ok(Llm1ServiceResult { structured_data, summary_text })
    }
}

fn render_system_prompt() -> String {
    "Voce e um assistente clinico para triagem de Endoscopia Digestiva Alta (EDA). \
     Responda apenas com JSON valido no schema v1.1, em pt-BR. \
     Nao invente fatos; use null/unknown quando faltar informacao."
        .to_string()
}

fn render_user_prompt(case_id: Uuid, agency_record_number: &str, clean_text: &str) -> String {
    format!(
        "Tarefa: extrair dados estruturados e resumo de um relatorio clinico para \
         triagem de EDA.\n\ncase_id: {case_id}\nagency_record_number: {agency_record_number}\n\n\
         Retorne JSON schema_version 1.1 e preserve agency_record_number exatamente.\n\n\
         Texto do relatorio:\n{clean_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Llm1Response {
        Llm1Response {
            schema_version: "1.1".to_string(),
            language: "pt-BR".to_string(),
            agency_record_number: "12345".to_string(),
            patient: Llm1Patient { name: None, age: Some(40), sex: Some("M".to_string()), document_id: None },
            eda: Llm1Eda {
                indication_category: "other".to_string(),
                exclusion_type: "none".to_string(),
                is_pediatric: false,
                foreign_body_suspected: false,
                requested_procedure: Llm1RequestedProcedure { name: None, urgency: "eletivo".to_string() },
                labs: Llm1Labs { hb_g_dl: None, platelets_per_mm3: None, inr: None, source_text_hint: None },
                ecg: Llm1Ecg {
                    report_present: "unknown".to_string(),
                    abnormal_flag: "unknown".to_string(),
                    source_text_hint: None,
                },
                asa: Llm1Asa { class_grade: "II".to_string(), confidence: "media".to_string(), rationale: None },
                cardiovascular_risk: Llm1CardiovascularRisk {
                    level: "low".to_string(),
                    confidence: "media".to_string(),
                    rationale: None,
                },
            },
            policy_precheck: Llm1PolicyPrecheck {
                excluded_from_eda_flow: false,
                exclusion_reason: None,
                labs_required: false,
                labs_pass: "unknown".to_string(),
                labs_failed_items: vec![],
                ecg_required: false,
                ecg_present: "unknown".to_string(),
                pediatric_flag: false,
                notes: None,
            },
            summary: Llm1Summary {
                one_liner: "Paciente estavel".to_string(),
                bullet_points: vec!["a".into(), "b".into(), "c".into()],
            },
            extraction_quality: Llm1ExtractionQuality {
                confidence: "media".to_string(),
                missing_fields: vec![],
                notes: None,
            },
        }
    }

    #[test]
    fn accepts_valid_payload() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_malformed_agency_record_number() {
        let mut payload = sample();
        payload.agency_record_number = "123456789012345".to_string();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn rejects_too_few_bullet_points() {
        let mut payload = sample();
        payload.summary.bullet_points = vec!["only one".into()];
        assert!(payload.validate().is_err());
    }

    #[test]
    fn rejects_unknown_fields_at_deserialize_time() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value.as_object_mut().unwrap().insert("doctor_user_id".to_string(), serde_json::json!("x"));
        let result: Result<Llm1Response, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }
}
