//! Strict parser for Room-3 scheduler reply templates.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::America::Bahia as Brt;
use chrono_tz::Tz;
use uuid::Uuid;

const EMPTY_REASON_MARKERS: &[&str] =
    &["", "(opcional)", "opcional", "(vazio)", "vazio", "-", "n/a", "na"];

/// Normalized scheduler reply fields extracted from strict template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReplyParsed {
    pub case_id: Uuid,
    pub appointment_status: AppointmentStatus,
    pub appointment_at: Option<chrono::DateTime<Tz>>,
    pub location: Option<String>,
    pub instructions: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Confirmed,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SchedulerParseError(pub &'static str);

/// Parse a denied/confirmed scheduler reply template for a specific case id.
///
/// Accepts three shapes: positional (first line a BRT datetime), header +
/// positional (`Confirmed:`/`Denied:` on line 1), and keyed
/// (`status:`/`data_hora:`/...). See `_extract_case_id` and
/// `_parse_status_template` below for the keyed shape, the other two fall
/// through to the positional path.
pub fn parse_scheduler_reply(
    body: &str,
    expected_case_id: Uuid,
) -> Result<SchedulerReplyParsed, SchedulerParseError> {
    let lines = normalized_message_lines(body);
    if lines.is_empty() {
        return Err(SchedulerParseError("empty_message"));
    }

    if extract_value(&lines, "status").is_some() {
        return parse_status_template(&lines, expected_case_id);
    }

    let case_id = extract_case_id(&lines)?;
    if case_id != expected_case_id {
        return Err(SchedulerParseError("case_id_mismatch"));
    }

    let parsed_lines = strip_section_headers(lines);
    if parsed_lines.is_empty() {
        return Err(SchedulerParseError("empty_message"));
    }

    let first_line = parsed_lines[0].trim().to_lowercase();
    if first_line == "denied" || first_line == "negado" {
        let reason = extract_value(&parsed_lines, "reason").and_then(|v| normalize_reason(&v));
        return Ok(SchedulerReplyParsed {
            case_id,
            appointment_status: AppointmentStatus::Denied,
            appointment_at: None,
            location: None,
            instructions: None,
            reason,
        });
    }

    let appointment_at = parse_brt_datetime(&parsed_lines[0])?;
    let location = extract_required_value(&parsed_lines, "location")?;
    let instructions = extract_required_value(&parsed_lines, "instructions")?;

    Ok(SchedulerReplyParsed {
        case_id,
        appointment_status: AppointmentStatus::Confirmed,
        appointment_at: Some(appointment_at),
        location: Some(location),
        instructions: Some(instructions),
        reason: None,
    })
}

fn parse_status_template(
    lines: &[String],
    expected_case_id: Uuid,
) -> Result<SchedulerReplyParsed, SchedulerParseError> {
    let case_id = extract_case_id(lines)?;
    if case_id != expected_case_id {
        return Err(SchedulerParseError("case_id_mismatch"));
    }

    let status_raw = extract_required_value(lines, "status")?.trim().to_lowercase();
    match status_raw.as_str() {
        "confirmado" | "confirmed" => {
            let date_time_raw = extract_required_value(lines, "date_time")?;
            let appointment_at = parse_brt_datetime(&date_time_raw)?;
            let location = extract_required_value(lines, "location")?;
            let instructions = extract_required_value(lines, "instructions")?;
            Ok(SchedulerReplyParsed {
                case_id,
                appointment_status: AppointmentStatus::Confirmed,
                appointment_at: Some(appointment_at),
                location: Some(location),
                instructions: Some(instructions),
                reason: None,
            })
        }
        "negado" | "denied" => {
            let reason = extract_value(lines, "reason").and_then(|v| normalize_reason(&v));
            Ok(SchedulerReplyParsed {
                case_id,
                appointment_status: AppointmentStatus::Denied,
                appointment_at: None,
                location: None,
                instructions: None,
                reason,
            })
        }
        _ => Err(SchedulerParseError("invalid_status_value")),
    }
}

fn extract_case_id(lines: &[String]) -> Result<Uuid, SchedulerParseError> {
    let value = extract_required_value(lines, "case")?;
    value.parse().map_err(|_| SchedulerParseError("invalid_case_line"))
}

/// Normalize optional section header lines used in Room-3 templates.
fn strip_section_headers(lines: Vec<String>) -> Vec<String> {
    if lines.is_empty() {
        return lines;
    }
    let first = lines[0].trim().to_lowercase();
    if matches!(first.as_str(), "confirmed" | "confirmed:" | "confirmado" | "confirmado:") {
        return lines[1..].to_vec();
    }
    if matches!(first.as_str(), "denied:" | "negado:") {
        if lines.len() >= 2 && matches!(lines[1].trim().to_lowercase().as_str(), "denied" | "negado") {
            return lines[1..].to_vec();
        }
        let mut out = vec!["denied".to_string()];
        out.extend(lines[1..].iter().cloned());
        return out;
    }
    lines
}

fn key_aliases(key: &str) -> &'static [&'static str] {
    match key {
        "case" => &["case", "caso"],
        "status" => &["status", "situacao", "situação"],
        "date_time" => &["data_hora", "datahora", "datetime", "data_hora_brt"],
        "location" => &["location", "local"],
        "instructions" => &["instructions", "instrucoes", "instruções"],
        "reason" => &["reason", "motivo"],
        _ => &[],
    }
}

fn extract_required_value(lines: &[String], key: &str) -> Result<String, SchedulerParseError> {
    match extract_value(lines, key) {
        Some(v) if !v.is_empty() => Ok(v),
        _ if key == "case" => Err(SchedulerParseError("missing_case_line")),
        _ => Err(SchedulerParseError(missing_line_reason(key))),
    }
}

fn missing_line_reason(key: &str) -> &'static str {
    match key {
        "status" => "missing_status_line",
        "date_time" => "missing_date_time_line",
        "location" => "missing_location_line",
        "instructions" => "missing_instructions_line",
        "reason" => "missing_reason_line",
        _ => "missing_field_line",
    }
}

fn extract_value(lines: &[String], key: &str) -> Option<String> {
    let aliases = key_aliases(key);
    for line in lines {
        let normalized = line.to_lowercase();
        for alias in aliases {
            let prefix = format!("{alias}:");
            if normalized.starts_with(&prefix) {
                return Some(line[prefix.len()..].trim().to_string());
            }
        }
    }
    None
}

fn normalized_message_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("```"))
        .map(str::to_string)
        .collect()
}

fn normalize_reason(reason: &str) -> Option<String> {
    let normalized = reason.trim();
    if EMPTY_REASON_MARKERS.contains(&normalized.to_lowercase().as_str()) {
        None
    } else {
        Some(normalized.to_string())
    }
}

fn parse_brt_datetime(line: &str) -> Result<chrono::DateTime<Tz>, SchedulerParseError> {
    let Some(raw) = line.strip_suffix(" BRT") else {
        return Err(SchedulerParseError("invalid_confirmed_datetime"));
    };
    let naive = NaiveDateTime::parse_from_str(raw, "%d-%m-%Y %H:%M")
        .map_err(|_| SchedulerParseError("invalid_confirmed_datetime"))?;
    Ok(Brt.from_local_datetime(&naive).single().unwrap_or_else(|| Brt.from_utc_datetime(&naive)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_confirmed_template() {
        let id = Uuid::new_v4();
        let body = format!(
            "22-02-2026 15:30 BRT\nlocation: CHD HGRS\ninstructions: jejum de 06 horas\ncase: {id}\n"
        );
        let parsed = parse_scheduler_reply(&body, id).unwrap();
        assert_eq!(parsed.appointment_status, AppointmentStatus::Confirmed);
        assert_eq!(parsed.location.as_deref(), Some("CHD HGRS"));
    }

    #[test]
    fn parses_keyed_confirmed_template() {
        let id = Uuid::new_v4();
        let body = format!(
            "status: confirmado\ndata_hora: 22-02-2026 15:30 BRT\nlocal: CHD HGRS\ninstrucoes: jejum\ncaso: {id}\n"
        );
        let parsed = parse_scheduler_reply(&body, id).unwrap();
        assert_eq!(parsed.appointment_status, AppointmentStatus::Confirmed);
        assert!(parsed.appointment_at.is_some());
    }

    #[test]
    fn parses_keyed_denied_with_empty_reason_marker() {
        let id = Uuid::new_v4();
        let body = format!("status: negado\nreason: n/a\ncaso: {id}\n");
        let parsed = parse_scheduler_reply(&body, id).unwrap();
        assert_eq!(parsed.appointment_status, AppointmentStatus::Denied);
        assert_eq!(parsed.reason, None);
    }

    #[test]
    fn parses_header_plus_positional_denied() {
        let id = Uuid::new_v4();
        let body = format!("Denied:\nreason: sem vaga\ncase: {id}\n");
        let parsed = parse_scheduler_reply(&body, id).unwrap();
        assert_eq!(parsed.appointment_status, AppointmentStatus::Denied);
        assert_eq!(parsed.reason.as_deref(), Some("sem vaga"));
    }

    #[test]
    fn rejects_case_id_mismatch() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let body = format!("status: confirmado\ndata_hora: 22-02-2026 15:30 BRT\nlocal: x\ninstrucoes: y\ncaso: {other}\n");
        let err = parse_scheduler_reply(&body, id).unwrap_err();
        assert_eq!(err.0, "case_id_mismatch");
    }

    #[test]
    fn rejects_malformed_datetime() {
        let id = Uuid::new_v4();
        let body = format!("not-a-date BRT\nlocation: x\ninstructions: y\ncase: {id}\n");
        let err = parse_scheduler_reply(&body, id).unwrap_err();
        assert_eq!(err.0, "invalid_confirmed_datetime");
    }

    #[test]
    fn rejects_invalid_status_value() {
        let id = Uuid::new_v4();
        let body = format!("status: talvez\ncaso: {id}\n");
        let err = parse_scheduler_reply(&body, id).unwrap_err();
        assert_eq!(err.0, "invalid_status_value");
    }
}
