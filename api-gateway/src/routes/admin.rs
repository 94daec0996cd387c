//! Manual verification trigger.

use axum::{Json, extract::State};
use serde::Serialize;

use staking::RunSummary;

use crate::state::SharedState;

/// Wire representation of a verification run summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummaryDto {
    pub total: usize,
    pub verified: usize,
    pub ended: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_reward: f64,
}

impl From<RunSummary> for RunSummaryDto {
    fn from(summary: RunSummary) -> Self {
        RunSummaryDto {
            total: summary.total,
            verified: summary.verified,
            ended: summary.ended,
            skipped: summary.skipped,
            failed: summary.failed,
            total_reward: summary.total_reward,
        }
    }
}

/// `POST /admin/verify`
///
/// Runs one full verification cycle immediately, outside the daily
/// schedule, and returns its summary. The run uses the same batching and
/// accrual path as the scheduled one, so triggering it twice in a row is
/// harmless: the second pass finds no elapsed interval and writes nothing.
pub async fn trigger_verification(State(state): State<SharedState>) -> Json<RunSummaryDto> {
    let summary = state.scheduler.run_once().await;
    Json(RunSummaryDto::from(summary))
}
