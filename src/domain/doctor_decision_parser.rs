//! Strict parser for Room-2 doctor decision reply templates.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

const REQUIRED_KEYS: &[&str] = &["decision", "support_flag", "case_id"];

const FORBIDDEN_TYPED_IDENTITY_KEYS: &[&str] =
    &["doctor_user_id", "medico_user_id", "usuario_medico"];

const EMPTY_REASON_MARKERS: &[&str] =
    &["", "(opcional)", "opcional", "(vazio)", "vazio", "-", "n/a", "na"];

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})")
        .expect("static pattern")
});

/// Normalized doctor decision fields extracted from strict template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorDecisionReplyParsed {
    pub case_id: Uuid,
    pub decision: Decision,
    pub support_flag: SupportFlag,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportFlag {
    None,
    Anesthesist,
    AnesthesistIcu,
}

impl SupportFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            SupportFlag::None => "none",
            SupportFlag::Anesthesist => "anesthesist",
            SupportFlag::AnesthesistIcu => "anesthesist_icu",
        }
    }
}

/// Deterministic parse failure with a machine-readable reason tag, stable
/// across versions since the reason text is posted back into chat.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DoctorDecisionParseError(pub &'static str);

/// Parse the strict Room-2 doctor decision reply template.
pub fn parse_doctor_decision_reply(
    body: &str,
    expected_case_id: Option<Uuid>,
) -> Result<DoctorDecisionReplyParsed, DoctorDecisionParseError> {
    let lines = normalized_message_lines(body);
    if lines.is_empty() {
        return Err(DoctorDecisionParseError("empty_message"));
    }

    let mut parsed_fields: HashMap<&'static str, String> = HashMap::new();
    for line in &lines {
        let normalized_line = line.replace('：', ":");
        let Some((key_raw, value)) = normalized_line.split_once(':') else { continue };

        let normalized_key = normalize_token(key_raw.trim());
        if FORBIDDEN_TYPED_IDENTITY_KEYS.contains(&normalized_key.as_str()) {
            return Err(DoctorDecisionParseError("unknown_field"));
        }
        let Some(parsed_key) = resolve_key(&normalized_key) else { continue };
        if parsed_fields.contains_key(parsed_key) {
            return Err(DoctorDecisionParseError("duplicate_field"));
        }
        parsed_fields.insert(parsed_key, value.trim().to_string());
    }

    for required_key in REQUIRED_KEYS {
        if !parsed_fields.contains_key(required_key) {
            return Err(DoctorDecisionParseError(match *required_key {
                "decision" => "missing_decision_line",
                "support_flag" => "missing_support_flag_line",
                "case_id" => "missing_case_id_line",
                _ => unreachable!(),
            }));
        }
    }

    let decision_raw = parsed_fields["decision"].to_lowercase();
    let decision = decision_alias(&decision_raw)
        .ok_or(DoctorDecisionParseError("invalid_decision_value"))?;

    let support_raw = parsed_fields["support_flag"].to_lowercase();
    let support_flag = support_alias(&support_raw)
        .ok_or(DoctorDecisionParseError("invalid_support_flag_value"))?;

    if decision == Decision::Deny && support_flag != SupportFlag::None {
        return Err(DoctorDecisionParseError("invalid_support_flag_for_decision"));
    }

    let mut case_raw = parsed_fields["case_id"].clone();
    if let Some(m) = UUID_PATTERN.find(&case_raw) {
        case_raw = m.as_str().to_string();
    }
    let case_id: Uuid =
        case_raw.parse().map_err(|_| DoctorDecisionParseError("invalid_case_line"))?;
    if let Some(expected) = expected_case_id {
        if case_id != expected {
            return Err(DoctorDecisionParseError("case_id_mismatch"));
        }
    }

    let reason = if decision == Decision::Accept {
        None
    } else {
        normalize_reason(parsed_fields.get("reason").map(String::as_str).unwrap_or(""))
    };

    Ok(DoctorDecisionReplyParsed { case_id, decision, support_flag, reason })
}

fn decision_alias(raw: &str) -> Option<Decision> {
    match raw {
        "accept" | "aceitar" | "aceito" | "aceita" => Some(Decision::Accept),
        "deny" | "negar" | "negado" | "negar." => Some(Decision::Deny),
        _ => None,
    }
}

fn support_alias(raw: &str) -> Option<SupportFlag> {
    match raw {
        "none" | "nenhum" => Some(SupportFlag::None),
        "anesthesist" | "anestesista" => Some(SupportFlag::Anesthesist),
        "anesthesist_icu" | "anestesista_uti" | "anestesista_icu" => {
            Some(SupportFlag::AnesthesistIcu)
        }
        _ => None,
    }
}

fn resolve_key(normalized_key: &str) -> Option<&'static str> {
    const ALIASES: &[(&str, &[&str])] = &[
        ("decision", &["decision", "decisao", "decisão"]),
        ("support_flag", &["support_flag", "suporte"]),
        ("reason", &["reason", "motivo"]),
        ("case_id", &["case_id", "caso"]),
    ];
    for (canonical, aliases) in ALIASES {
        if aliases.iter().any(|alias| normalize_token(alias) == normalized_key) {
            return Some(canonical);
        }
    }
    None
}

fn normalized_message_lines(body: &str) -> Vec<&str> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("```"))
        .filter(|line| !line.starts_with('>'))
        .collect()
}

fn normalize_reason(reason_raw: &str) -> Option<String> {
    let normalized = reason_raw.trim();
    if EMPTY_REASON_MARKERS.contains(&normalized.to_lowercase().as_str()) {
        None
    } else {
        Some(normalized.to_string())
    }
}

fn normalize_token(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let trimmed = lowered.trim_matches(|c| "`*_ ".contains(c));
    let replaced = trimmed.replace(['-', '/', ' '], "_");
    let stripped: String = replaced.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let collapsed = collapse_underscores(&stripped);
    collapsed.trim_matches('_').to_string()
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(case_id: Uuid, decision: &str, support_flag: &str, reason: Option<&str>) -> String {
        let mut body = format!("decision: {decision}\nsupport_flag: {support_flag}\n");
        if let Some(reason) = reason {
            body.push_str(&format!("reason: {reason}\n"));
        }
        body.push_str(&format!("case_id: {case_id}\n"));
        body
    }

    #[test]
    fn parses_accept_with_none_support() {
        let id = Uuid::new_v4();
        let body = render(id, "accept", "none", None);
        let parsed = parse_doctor_decision_reply(&body, Some(id)).unwrap();
        assert_eq!(parsed.decision, Decision::Accept);
        assert_eq!(parsed.support_flag, SupportFlag::None);
        assert_eq!(parsed.reason, None);
    }

    #[test]
    fn parses_portuguese_aliases_and_strips_diacritics() {
        let id = Uuid::new_v4();
        let body = format!(
            "decisão: aceita\nsuporte: anestesista\ncaso: {id}\n"
        );
        let parsed = parse_doctor_decision_reply(&body, Some(id)).unwrap();
        assert_eq!(parsed.decision, Decision::Accept);
        assert_eq!(parsed.support_flag, SupportFlag::Anesthesist);
    }

    #[test]
    fn deny_requires_none_support_flag() {
        let id = Uuid::new_v4();
        let body = render(id, "deny", "anesthesist", Some("motivo clinico"));
        let err = parse_doctor_decision_reply(&body, Some(id)).unwrap_err();
        assert_eq!(err.0, "invalid_support_flag_for_decision");
    }

    #[test]
    fn deny_with_empty_reason_marker_normalizes_to_none() {
        let id = Uuid::new_v4();
        let body = render(id, "deny", "none", Some("n/a"));
        let parsed = parse_doctor_decision_reply(&body, Some(id)).unwrap();
        assert_eq!(parsed.reason, None);
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = parse_doctor_decision_reply("   \n  ", None).unwrap_err();
        assert_eq!(err.0, "empty_message");
    }

    #[test]
    fn missing_required_line_is_reported() {
        let id = Uuid::new_v4();
        let body = format!("decision: accept\ncase_id: {id}\n");
        let err = parse_doctor_decision_reply(&body, Some(id)).unwrap_err();
        assert_eq!(err.0, "missing_support_flag_line");
    }

    #[test]
    fn duplicate_recognized_key_is_rejected() {
        let id = Uuid::new_v4();
        let body = format!(
            "decision: accept\ndecision: deny\nsupport_flag: none\ncase_id: {id}\n"
        );
        let err = parse_doctor_decision_reply(&body, Some(id)).unwrap_err();
        assert_eq!(err.0, "duplicate_field");
    }

    #[test]
    fn forbidden_typed_identity_key_is_rejected() {
        let id = Uuid::new_v4();
        let body = format!(
            "doctor_user_id: @doc:matrix.org\ndecision: accept\nsupport_flag: none\ncase_id: {id}\n"
        );
        let err = parse_doctor_decision_reply(&body, Some(id)).unwrap_err();
        assert_eq!(err.0, "unknown_field");
    }

    #[test]
    fn case_id_mismatch_is_detected() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let body = render(id, "accept", "none", None);
        let err = parse_doctor_decision_reply(&body, Some(other)).unwrap_err();
        assert_eq!(err.0, "case_id_mismatch");
    }

    #[test]
    fn case_id_is_extracted_from_surrounding_text() {
        let id = Uuid::new_v4();
        let body = format!(
            "decision: accept\nsupport_flag: none\ncase_id: ref #{id} (triage)\n"
        );
        let parsed = parse_doctor_decision_reply(&body, Some(id)).unwrap();
        assert_eq!(parsed.case_id, id);
    }

    #[test]
    fn quoted_and_fenced_lines_are_ignored() {
        let id = Uuid::new_v4();
        let body = format!(
            "```\ndecision: accept\n```\n> irrelevant quoted line\nsupport_flag: none\ncase_id: {id}\n"
        );
        let parsed = parse_doctor_decision_reply(&body, Some(id)).unwrap();
        assert_eq!(parsed.decision, Decision::Accept);
    }
}
