//! Supervisor summary poster (C17): aggregates the C12 window counters on a
//! cron schedule and posts the rendered body to the Room-4 supervisor room.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Days, TimeZone, Utc};
use chrono_tz::America::Bahia as Brt;
use cron::Schedule;
use tracing::{info, warn};

use crate::chat::templates::build_room4_summary_message;
use crate::chat::ChatGateway;
use crate::error::SummaryError;
use crate::store::SummaryMetricsQuery;

/// The most recently elapsed BRT calendar day as of `fired_at`, expressed as
/// a UTC half-open window `[window_start, window_end)`.
fn elapsed_day_window(fired_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let fired_at_brt = fired_at.with_timezone(&Brt);
    let window_end_brt = fired_at_brt
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");
    let window_start_brt = window_end_brt - Days::new(1);

    let window_start = Brt.from_local_datetime(&window_start_brt).single().unwrap_or(fired_at_brt).with_timezone(&Utc);
    let window_end = Brt.from_local_datetime(&window_end_brt).single().unwrap_or(fired_at_brt).with_timezone(&Utc);
    (window_start, window_end)
}

pub struct SummaryScheduler {
    schedule: Schedule,
    metrics: Arc<dyn SummaryMetricsQuery>,
    chat: Arc<dyn ChatGateway>,
    room4_id: String,
}

impl SummaryScheduler {
    pub fn new(
        cron_expression: &str,
        metrics: Arc<dyn SummaryMetricsQuery>,
        chat: Arc<dyn ChatGateway>,
        room4_id: String,
    ) -> Result<Self, SummaryError> {
        let schedule = Schedule::from_str(cron_expression)
            .map_err(|err| SummaryError::InvalidSchedule(err.to_string()))?;
        Ok(Self { schedule, metrics, chat, room4_id })
    }

    /// Aggregate the elapsed day as of `fired_at` and post it to Room 4.
    pub async fn run_once(&self, fired_at: DateTime<Utc>) -> Result<(), SummaryError> {
        let (window_start, window_end) = elapsed_day_window(fired_at);
        let metrics = self.metrics.aggregate_metrics(window_start, window_end).await?;

        let body = build_room4_summary_message(
            &window_start.with_timezone(&Brt).format("%d-%m-%Y %H:%M").to_string(),
            &window_end.with_timezone(&Brt).format("%d-%m-%Y %H:%M").to_string(),
            metrics.patients_received,
            metrics.reports_processed,
            metrics.cases_evaluated,
            metrics.accepted,
            metrics.refused,
        );

        self.chat.post_text(&self.room4_id, &body).await?;
        info!(
            window_start = %window_start,
            window_end = %window_end,
            patients_received = metrics.patients_received,
            cases_evaluated = metrics.cases_evaluated,
            "summary_posted"
        );
        Ok(())
    }

    /// Sleep until each scheduled fire time and post, until `shutdown` reports true.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let now = Utc::now();
            let Some(next_fire) = self.schedule.upcoming(Utc).take(1).next() else {
                warn!("summary_schedule_exhausted");
                return;
            };
            let sleep_for = (next_fire - now).to_std().unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.changed() => continue,
            }
            if *shutdown.borrow() {
                return;
            }

            if let Err(err) = self.run_once(Utc::now()).await {
                warn!(error = %err, "summary_post_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn elapsed_day_window_spans_the_previous_brt_calendar_day() {
        // 2026-02-16 11:00 UTC is 2026-02-16 08:00 BRT (UTC-3).
        let fired_at = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 2, 16).unwrap().and_hms_opt(11, 0, 0).unwrap(),
        );
        let (start, end) = elapsed_day_window(fired_at);
        assert_eq!(start.with_timezone(&Brt).date_naive(), NaiveDate::from_ymd_opt(2026, 2, 15).unwrap());
        assert_eq!(end.with_timezone(&Brt).date_naive(), NaiveDate::from_ymd_opt(2026, 2, 16).unwrap());
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    #[test]
    fn rejects_invalid_cron_expressions() {
        struct NoopChat;
        #[async_trait::async_trait]
        impl ChatGateway for NoopChat {
            async fn post_text(&self, _room_id: &str, _body: &str) -> Result<String, crate::chat::ChatGatewayError> {
                unreachable!()
            }
            async fn reply_text(
                &self,
                _room_id: &str,
                _parent_event_id: &str,
                _body: &str,
            ) -> Result<String, crate::chat::ChatGatewayError> {
                unreachable!()
            }
            async fn redact_event(&self, _room_id: &str, _event_id: &str) -> Result<(), crate::chat::ChatGatewayError> {
                unreachable!()
            }
            async fn download_media(&self, _uri: &str) -> Result<Vec<u8>, crate::chat::ChatGatewayError> {
                unreachable!()
            }
        }

        struct NoopMetrics;
        #[async_trait::async_trait]
        impl SummaryMetricsQuery for NoopMetrics {
            async fn aggregate_metrics(
                &self,
                _window_start: DateTime<Utc>,
                _window_end: DateTime<Utc>,
            ) -> Result<crate::store::SupervisorSummaryMetrics, crate::error::StoreError> {
                unreachable!()
            }
        }

        let result = SummaryScheduler::new("not a cron expression", Arc::new(NoopMetrics), Arc::new(NoopChat), "!room4:example.org".to_string());
        assert!(result.is_err());
    }
}
