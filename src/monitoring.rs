//! Monitoring read model (C11): paginated case list and per-case timeline.
//!
//! Read-only; no transitions, no journal writes. Backs the dashboard's
//! `GET /monitoring/cases` and `GET /monitoring/cases/{case_id}` routes.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::case_status::CaseStatus;
use crate::error::ApiError;
use crate::store::{CaseListEntry, CaseStore, JournalStore, TimelineEntry};

#[derive(Debug, Clone)]
pub struct CaseListParams {
    pub page: u32,
    pub page_size: u32,
    pub status: Option<CaseStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseListPage {
    pub cases: Vec<CaseListEntry>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    pub case_id: Uuid,
    pub status: CaseStatus,
    pub timeline: Vec<TimelineEntry>,
}

pub struct CaseMonitoringService {
    cases: Arc<dyn CaseStore>,
    journal: Arc<dyn JournalStore>,
}

impl CaseMonitoringService {
    pub fn new(cases: Arc<dyn CaseStore>, journal: Arc<dyn JournalStore>) -> Self {
        Self { cases, journal }
    }

    pub async fn list_cases(&self, params: CaseListParams) -> Result<CaseListPage, ApiError> {
        if params.page < 1 || params.page_size < 1 {
            return Err(ApiError::BadRequest("page and page_size must be >= 1".to_string()));
        }

        let today = Utc::now().date_naive();
        let (from_date, to_date) = match (params.from_date, params.to_date) {
            (None, None) => (today, today),
            (Some(from), Some(to)) => (from, to),
            (Some(from), None) => (from, from),
            (None, Some(to)) => (to, to),
        };
        if to_date < from_date {
            return Err(ApiError::InvalidPeriod);
        }

        let window_start = from_date.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc();
        let window_end = (to_date + Days::new(1))
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();

        let (cases, total) = self
            .cases
            .list_cases_page(params.status, window_start, window_end, params.page, params.page_size)
            .await?;

        Ok(CaseListPage { cases, page: params.page, page_size: params.page_size, total })
    }

    pub async fn get_case_detail(&self, case_id: Uuid) -> Result<CaseDetail, ApiError> {
        let case = self
            .cases
            .get_case(case_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("case not found: {case_id}")))?;
        let timeline = self.journal.list_timeline_for_case(case_id).await?;
        Ok(CaseDetail { case_id: case.case_id, status: case.status, timeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;

    use crate::domain::models::*;
    use crate::error::StoreError;
    use crate::store::{CaseCreateInput, CaseEventInput, MessageRef};

    struct FakeStore {
        case: Option<Case>,
    }

    #[async_trait]
    impl CaseStore for FakeStore {
        async fn create_case(&self, _input: CaseCreateInput) -> Result<Case, StoreError> {
            unreachable!("not exercised by monitoring tests")
        }
        async fn get_case(&self, _case_id: Uuid) -> Result<Option<Case>, StoreError> {
            Ok(self.case.clone())
        }
        async fn get_case_by_origin_event_id(&self, _id: &str) -> Result<Option<Case>, StoreError> {
            unreachable!()
        }
        async fn set_status_with_transition(&self, _id: Uuid, _to: CaseStatus) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn store_pdf_extraction(
            &self,
            _id: Uuid,
            _text: &str,
            _record: &str,
            _to: CaseStatus,
        ) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn store_llm1_artifacts(
            &self,
            _id: Uuid,
            _data: serde_json::Value,
            _to: CaseStatus,
        ) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn store_suggested_action(
            &self,
            _id: Uuid,
            _data: serde_json::Value,
            _to: CaseStatus,
        ) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn record_doctor_decision(
            &self,
            _id: Uuid,
            _decision: DoctorDecision,
            _flag: &str,
            _reason: Option<&str>,
            _to: CaseStatus,
        ) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn record_scheduler_outcome(
            &self,
            _id: Uuid,
            _status: AppointmentStatus,
            _at: Option<DateTime<Utc>>,
            _loc: Option<&str>,
            _instr: Option<&str>,
            _reason: Option<&str>,
            _to: CaseStatus,
        ) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn set_room1_final_reply(&self, _id: Uuid, _event: &str, _to: CaseStatus) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn mark_cleanup_completed(&self, _id: Uuid) -> Result<Case, StoreError> {
            unreachable!()
        }
        async fn list_cases_page(
            &self,
            _status: Option<CaseStatus>,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _page: u32,
            _page_size: u32,
        ) -> Result<(Vec<CaseListEntry>, u64), StoreError> {
            let entries = self
                .case
                .clone()
                .into_iter()
                .map(|case| CaseListEntry { latest_activity_at: case.updated_at, case })
                .collect();
            Ok((entries, 1))
        }
    }

    #[async_trait]
    impl JournalStore for FakeStore {
        async fn append_case_event(&self, _input: CaseEventInput) -> Result<CaseEvent, StoreError> {
            unreachable!()
        }
        async fn append_auth_event(
            &self,
            _user: Option<Uuid>,
            _event: &str,
            _ip: Option<&str>,
            _ua: Option<&str>,
            _payload: serde_json::Value,
        ) -> Result<AuthEvent, StoreError> {
            unreachable!()
        }
        async fn add_case_message(
            &self,
            _case: Uuid,
            _room: &str,
            _event: &str,
            _sender: Option<&str>,
            _kind: &str,
        ) -> Result<CaseMessage, StoreError> {
            unreachable!()
        }
        async fn list_message_refs_for_case(&self, _case: Uuid) -> Result<Vec<MessageRef>, StoreError> {
            unreachable!()
        }
        async fn get_case_id_by_message_ref(
            &self,
            _room_id: &str,
            _external_event_id: &str,
        ) -> Result<Option<Uuid>, StoreError> {
            unreachable!()
        }
        async fn list_timeline_for_case(&self, _case: Uuid) -> Result<Vec<TimelineEntry>, StoreError> {
            Ok(vec![])
        }
    }

    fn sample_case() -> Case {
        Case {
            case_id: Uuid::new_v4(),
            status: CaseStatus::WaitDoctor,
            room1_origin_room_id: "!r1:example.org".to_string(),
            room1_origin_event_id: "$1".to_string(),
            room1_sender_user_id: "@human:example.org".to_string(),
            pdf_source_uri: None,
            extracted_text: None,
            agency_record_number: None,
            structured_data: None,
            suggested_action: None,
            doctor_decision: None,
            doctor_support_flag: None,
            doctor_reason: None,
            doctor_decided_at: None,
            appointment_status: None,
            appointment_at: None,
            appointment_location: None,
            appointment_instructions: None,
            appointment_reason: None,
            appointment_decided_at: None,
            room1_final_reply_event_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(case: Option<Case>) -> CaseMonitoringService {
        let store = Arc::new(FakeStore { case });
        CaseMonitoringService::new(store.clone(), store)
    }

    #[tokio::test]
    async fn rejects_to_date_before_from_date() {
        let svc = service(None);
        let params = CaseListParams {
            page: 1,
            page_size: 20,
            status: None,
            from_date: NaiveDate::from_ymd_opt(2026, 2, 10),
            to_date: NaiveDate::from_ymd_opt(2026, 2, 9),
        };
        let err = svc.list_cases(params).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidPeriod));
    }

    #[tokio::test]
    async fn rejects_zero_page() {
        let svc = service(None);
        let params = CaseListParams { page: 0, page_size: 20, status: None, from_date: None, to_date: None };
        let err = svc.list_cases(params).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn defaults_to_todays_window_when_dates_absent() {
        let svc = service(Some(sample_case()));
        let params = CaseListParams { page: 1, page_size: 20, status: None, from_date: None, to_date: None };
        let page = svc.list_cases(params).await.unwrap();
        assert_eq!(page.cases.len(), 1);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn detail_maps_missing_case_to_not_found() {
        let svc = service(None);
        let err = svc.get_case_detail(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn detail_returns_timeline_for_known_case() {
        let case = sample_case();
        let case_id = case.case_id;
        let svc = service(Some(case));
        let detail = svc.get_case_detail(case_id).await.unwrap();
        assert_eq!(detail.case_id, case_id);
        assert_eq!(detail.status, CaseStatus::WaitDoctor);
    }
}
