//! Case status enum for the triage state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// All case statuses defined by the handoff specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    New,
    R1AckProcessing,
    Extracting,
    LlmStruct,
    LlmSuggest,
    R2PostWidget,
    WaitDoctor,
    DoctorDenied,
    DoctorAccepted,
    R3PostRequest,
    WaitAppt,
    ApptConfirmed,
    ApptDenied,
    Failed,
    /// Legacy status kept in the enum for wire compatibility; no handler in
    /// this codebase ever produces it. Runtime jumps directly from
    /// APPT/FAILED/DOCTOR_DENIED to `WaitR1CleanupThumbs`.
    R1FinalReplyPosted,
    WaitR1CleanupThumbs,
    CleanupRunning,
    Cleaned,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::New => "NEW",
            CaseStatus::R1AckProcessing => "R1_ACK_PROCESSING",
            CaseStatus::Extracting => "EXTRACTING",
            CaseStatus::LlmStruct => "LLM_STRUCT",
            CaseStatus::LlmSuggest => "LLM_SUGGEST",
            CaseStatus::R2PostWidget => "R2_POST_WIDGET",
            CaseStatus::WaitDoctor => "WAIT_DOCTOR",
            CaseStatus::DoctorDenied => "DOCTOR_DENIED",
            CaseStatus::DoctorAccepted => "DOCTOR_ACCEPTED",
            CaseStatus::R3PostRequest => "R3_POST_REQUEST",
            CaseStatus::WaitAppt => "WAIT_APPT",
            CaseStatus::ApptConfirmed => "APPT_CONFIRMED",
            CaseStatus::ApptDenied => "APPT_DENIED",
            CaseStatus::Failed => "FAILED",
            CaseStatus::R1FinalReplyPosted => "R1_FINAL_REPLY_POSTED",
            CaseStatus::WaitR1CleanupThumbs => "WAIT_R1_CLEANUP_THUMBS",
            CaseStatus::CleanupRunning => "CLEANUP_RUNNING",
            CaseStatus::Cleaned => "CLEANED",
        }
    }

    pub const ALL: &'static [CaseStatus] = &[
        CaseStatus::New,
        CaseStatus::R1AckProcessing,
        CaseStatus::Extracting,
        CaseStatus::LlmStruct,
        CaseStatus::LlmSuggest,
        CaseStatus::R2PostWidget,
        CaseStatus::WaitDoctor,
        CaseStatus::DoctorDenied,
        CaseStatus::DoctorAccepted,
        CaseStatus::R3PostRequest,
        CaseStatus::WaitAppt,
        CaseStatus::ApptConfirmed,
        CaseStatus::ApptDenied,
        CaseStatus::Failed,
        CaseStatus::R1FinalReplyPosted,
        CaseStatus::WaitR1CleanupThumbs,
        CaseStatus::CleanupRunning,
        CaseStatus::Cleaned,
    ];
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializes/deserializes using the wire string (`"NEW"`, `"R1_ACK_PROCESSING"`,
/// …), not the derive-default variant name, so HTTP/DB JSON matches `as_str()`.
impl Serialize for CaseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CaseStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized case status: {0}")]
pub struct ParseCaseStatusError(String);

impl FromStr for CaseStatus {
    type Err = ParseCaseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NEW" => CaseStatus::New,
            "R1_ACK_PROCESSING" => CaseStatus::R1AckProcessing,
            "EXTRACTING" => CaseStatus::Extracting,
            "LLM_STRUCT" => CaseStatus::LlmStruct,
            "LLM_SUGGEST" => CaseStatus::LlmSuggest,
            "R2_POST_WIDGET" => CaseStatus::R2PostWidget,
            "WAIT_DOCTOR" => CaseStatus::WaitDoctor,
            "DOCTOR_DENIED" => CaseStatus::DoctorDenied,
            "DOCTOR_ACCEPTED" => CaseStatus::DoctorAccepted,
            "R3_POST_REQUEST" => CaseStatus::R3PostRequest,
            "WAIT_APPT" => CaseStatus::WaitAppt,
            "APPT_CONFIRMED" => CaseStatus::ApptConfirmed,
            "APPT_DENIED" => CaseStatus::ApptDenied,
            "FAILED" => CaseStatus::Failed,
            "R1_FINAL_REPLY_POSTED" => CaseStatus::R1FinalReplyPosted,
            "WAIT_R1_CLEANUP_THUMBS" => CaseStatus::WaitR1CleanupThumbs,
            "CLEANUP_RUNNING" => CaseStatus::CleanupRunning,
            "CLEANED" => CaseStatus::Cleaned,
            other => return Err(ParseCaseStatusError(other.to_string())),
        })
    }
}

impl postgres_types::ToSql for CaseStatus {
    fn to_sql(
        &self,
        ty: &postgres_types::Type,
        out: &mut bytes::BytesMut,
    ) -> Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        self.as_str().to_sql(ty, out)
    }

    fn accepts(ty: &postgres_types::Type) -> bool {
        <&str as postgres_types::ToSql>::accepts(ty)
    }

    postgres_types::to_sql_checked!();
}

impl<'a> postgres_types::FromSql<'a> for CaseStatus {
    fn from_sql(
        ty: &postgres_types::Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let s = <&str as postgres_types::FromSql>::from_sql(ty, raw)?;
        Ok(s.parse()?)
    }

    fn accepts(ty: &postgres_types::Type) -> bool {
        <&str as postgres_types::FromSql>::accepts(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_status_through_display_and_from_str() {
        for status in CaseStatus::ALL {
            let rendered = status.to_string();
            let parsed: CaseStatus = rendered.parse().unwrap();
            assert_eq!(parsed, *status);
        }
    }

    #[test]
    fn rejects_unknown_status() {
        assert!("NOT_A_STATUS".parse::<CaseStatus>().is_err());
    }
}
