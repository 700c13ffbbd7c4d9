//! Pure outbound message body builders for rooms 1–3.
//!
//! No Chat Gateway I/O lives here — these functions turn case data into the
//! bit-exact strings §6's external interface table specifies, so the worker
//! handlers only need to call `post_text`/`reply_text` with the result.

use serde_json::Value;
use uuid::Uuid;

pub const PROCESSING_ACK_BODY: &str = "processando...";

pub fn build_room2_case_pdf_message(case_id: Uuid, agency_record_number: &str, pdf_mxc_url: &str) -> String {
    format!(
        "📄 Novo caso: {case_id}\nregistro: {agency_record_number}\nPDF original: {pdf_mxc_url}"
    )
}

pub fn build_room2_case_summary_message(
    case_id: Uuid,
    structured_data: &Value,
    summary_text: &str,
    suggested_action: &Value,
) -> String {
    let structured_json = serde_json::to_string_pretty(structured_data)
        .unwrap_or_else(|_| structured_data.to_string());
    let suggestion_json = serde_json::to_string_pretty(suggested_action)
        .unwrap_or_else(|_| suggested_action.to_string());
    format!(
        "📋 Caso: {case_id}\n\nResumo: {summary_text}\n\nDados estruturados:\n{structured_json}\n\nRecomendacao:\n{suggestion_json}"
    )
}

pub fn build_room2_case_decision_instructions_message(case_id: Uuid) -> String {
    format!(
        "Reply to this message with:\n\
         decision: accept|deny\n\
         support_flag: none|anesthesist|anesthesist_icu\n\
         reason: <opcional>\n\
         case_id: {case_id}"
    )
}

pub fn build_room2_decision_ack_message(
    case_id: Uuid,
    decision: &str,
    support_flag: &str,
    reason: Option<&str>,
) -> String {
    format!(
        "resultado: sucesso\ndecision: {decision}\nsupport_flag: {support_flag}\nreason: {reason}\ncase_id: {case_id}",
        reason = reason.unwrap_or("")
    )
}

pub fn build_room3_request_message(
    case_id: Uuid,
    agency_record_number: &str,
    patient_name: &str,
    patient_age: &str,
) -> String {
    format!(
        "🏥 Solicitacao de agendamento\n\
         case: {case_id}\n\
         registro: {agency_record_number}\n\
         paciente: {patient_name}\n\
         idade: {patient_age}\n\n\
         Este e o caso esperado.\n\
         Por favor copie a proxima mensagem e preencha os campos."
    )
}

pub fn build_room3_scheduler_template_message(case_id: Uuid) -> String {
    format!(
        "status: confirmado\n\
         data_hora: DD-MM-YYYY HH:MM BRT\n\
         local: \n\
         instrucoes: \n\
         caso: {case_id}"
    )
}

pub fn build_room1_final_appt_confirmed_message(
    case_id: Uuid,
    appointment_at_brt: &str,
    location: &str,
    instructions: &str,
) -> String {
    format!(
        "✅ accepted\nappointment: {appointment_at_brt} BRT\nlocation: {location}\ninstructions: {instructions}\ncase: {case_id}"
    )
}

pub fn build_room1_final_denial_triage_message(case_id: Uuid, reason: &str) -> String {
    format!("❌ denied (triage)\nreason: {reason}\ncase: {case_id}")
}

pub fn build_room1_final_appt_denied_message(case_id: Uuid, reason: &str) -> String {
    format!("❌ denied (appointment)\nreason: {reason}\ncase: {case_id}")
}

pub fn build_room1_final_failure_message(case_id: Uuid, cause: &str, details: &str) -> String {
    format!("⚠️ processing failed\ncause: {cause}\ndetails: {details}\ncase: {case_id}")
}

/// Renders the C12 aggregate for the Room-4 supervisor room. `refused` sums
/// doctor denials and scheduler denials without deduplication — a case
/// denied at both stages is counted twice, matching the source formula.
pub fn build_room4_summary_message(
    window_start_brt: &str,
    window_end_brt: &str,
    patients_received: u64,
    reports_processed: u64,
    cases_evaluated: u64,
    accepted: u64,
    refused: u64,
) -> String {
    format!(
        "📊 Supervisão diária ({window_start_brt} a {window_end_brt} BRT)\n\
         Pacientes recebidos: {patients_received}\n\
         Relatórios processados: {reports_processed}\n\
         Casos avaliados: {cases_evaluated}\n\
         Aceitos: {accepted}\n\
         Recusados: {refused}"
    )
}

/// Pull `patient.name`/`patient.age` out of the opaque LLM1 structured-data
/// value for the room-3 request message; missing fields render as `"?"`.
pub fn patient_name_from_structured_data(structured_data: &Value) -> String {
    structured_data
        .pointer("/patient/name")
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string()
}

pub fn patient_age_from_structured_data(structured_data: &Value) -> String {
    match structured_data.pointer("/patient/age") {
        Some(Value::Number(n)) => n.to_string(),
        _ => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pdf_message_contains_case_record_and_label() {
        let case_id = Uuid::new_v4();
        let body = build_room2_case_pdf_message(case_id, "47773", "mxc://x/y");
        assert!(body.contains(&case_id.to_string()));
        assert!(body.contains("47773"));
        assert!(body.contains("mxc://x/y"));
        assert!(body.contains("PDF original"));
    }

    #[test]
    fn summary_message_embeds_pretty_json_and_labels() {
        let case_id = Uuid::new_v4();
        let structured = json!({"eda": {"policy_precheck": {"labs_pass": "yes"}}});
        let suggestion = json!({"suggestion": "accept"});
        let body = build_room2_case_summary_message(case_id, &structured, "resumo", &suggestion);
        assert!(body.contains(&case_id.to_string()));
        assert!(body.contains("resumo"));
        assert!(body.contains("\"labs_pass\": \"yes\""));
        assert!(body.contains("\"suggestion\": \"accept\""));
        assert!(body.contains("Dados estruturados"));
        assert!(body.contains("Recomendacao"));
    }

    #[test]
    fn decision_instructions_contain_required_tokens() {
        let case_id = Uuid::new_v4();
        let body = build_room2_case_decision_instructions_message(case_id);
        assert!(body.to_lowercase().contains("reply"));
        assert!(body.contains("decision: accept|deny"));
        assert!(body.contains("support_flag: none|anesthesist|anesthesist_icu"));
        assert!(body.contains("reason:"));
        assert!(body.contains(&format!("case_id: {case_id}")));
    }

    #[test]
    fn decision_ack_contains_all_fields() {
        let case_id = Uuid::new_v4();
        let body = build_room2_decision_ack_message(case_id, "accept", "none", Some("ok"));
        assert!(body.contains("resultado: sucesso"));
        assert!(body.contains(&format!("case_id: {case_id}")));
        assert!(body.contains("decision: accept"));
        assert!(body.contains("support_flag: none"));
        assert!(body.contains("reason: ok"));
    }

    #[test]
    fn room3_request_message_contains_required_fields() {
        let case_id = Uuid::new_v4();
        let body = build_room3_request_message(case_id, "4777300", "EVALDO CARDOSO DOS SANTOS", "42");
        assert!(body.contains(&case_id.to_string()));
        assert!(body.contains("registro: 4777300"));
        assert!(body.contains("paciente: EVALDO CARDOSO DOS SANTOS"));
        assert!(body.contains("idade: 42"));
        assert!(body.to_lowercase().contains("caso esperado"));
        assert!(body.to_lowercase().contains("copie a proxima mensagem"));
    }

    #[test]
    fn room3_template_message_contains_placeholders() {
        let case_id = Uuid::new_v4();
        let body = build_room3_scheduler_template_message(case_id);
        assert!(body.contains("status: confirmado"));
        assert!(body.contains("data_hora: DD-MM-YYYY HH:MM BRT"));
        assert!(body.contains(&format!("caso: {case_id}")));
    }

    #[test]
    fn final_messages_match_exact_templates() {
        let case_id = Uuid::new_v4();
        assert_eq!(
            build_room1_final_appt_confirmed_message(case_id, "16-02-2026 14:30", "Sala 2", "Jejum 8h"),
            format!(
                "✅ accepted\nappointment: 16-02-2026 14:30 BRT\nlocation: Sala 2\ninstructions: Jejum 8h\ncase: {case_id}"
            )
        );
        assert_eq!(
            build_room1_final_denial_triage_message(case_id, "critério clínico"),
            format!("❌ denied (triage)\nreason: critério clínico\ncase: {case_id}")
        );
        assert_eq!(
            build_room1_final_appt_denied_message(case_id, "sem agenda"),
            format!("❌ denied (appointment)\nreason: sem agenda\ncase: {case_id}")
        );
        assert_eq!(
            build_room1_final_failure_message(case_id, "llm", "schema mismatch"),
            format!("⚠️ processing failed\ncause: llm\ndetails: schema mismatch\ncase: {case_id}")
        );
    }

    #[test]
    fn room4_summary_message_contains_all_counters() {
        let body = build_room4_summary_message("15-02-2026 00:00", "16-02-2026 00:00", 12, 10, 9, 6, 3);
        assert!(body.contains("Supervisão diária"));
        assert!(body.contains("Pacientes recebidos: 12"));
        assert!(body.contains("Relatórios processados: 10"));
        assert!(body.contains("Casos avaliados: 9"));
        assert!(body.contains("Aceitos: 6"));
        assert!(body.contains("Recusados: 3"));
    }

    #[test]
    fn patient_fields_extracted_from_structured_data() {
        let data = json!({"patient": {"name": "EVALDO", "age": 42}});
        assert_eq!(patient_name_from_structured_data(&data), "EVALDO");
        assert_eq!(patient_age_from_structured_data(&data), "42");
    }
}
