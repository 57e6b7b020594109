use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::models::{kind_name, ReminderListItem};
use crate::reminders::{ReminderScheduler, ReminderStatus, SchedulerError, StatusCounts};
use crate::trigger::{JobStatus, TriggerError, TriggerService};

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub scheduler: ReminderScheduler,
    pub triggers: TriggerService,
    pub default_channel: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Reminders
        .route("/reminders", get(list_reminders).post(create_reminder))
        .route("/reminders/stats", get(reminder_stats))
        .route("/reminders/:id/cancel", post(cancel_reminder))
        // Trigger jobs
        .route("/jobs", get(list_jobs))
        .route("/jobs/:name/trigger", post(trigger_job))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

fn internal_err(e: anyhow::Error) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("internal error: {e}"),
    )
}

fn scheduler_err(e: SchedulerError) -> (StatusCode, String) {
    match e {
        SchedulerError::UnparseableTime(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        SchedulerError::Store(e) => internal_err(e),
    }
}

fn trigger_err(e: TriggerError) -> (StatusCode, String) {
    match e {
        TriggerError::UnknownJob(_) => (StatusCode::NOT_FOUND, e.to_string()),
        _ => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReminderRequest {
    pub message: String,
    pub when: String,
    pub channel: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReminderResponse {
    pub id: Uuid,
    pub kind: String,
    pub trigger_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
}

pub async fn create_reminder(
    State(state): State<ApiState>,
    Json(body): Json<CreateReminderRequest>,
) -> Result<Json<CreateReminderResponse>, (StatusCode, String)> {
    if body.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".into()));
    }

    let channel = body
        .channel
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_channel.clone());

    let reminder = state
        .scheduler
        .add_reminder(&body.message, &body.when, &channel)
        .await
        .map_err(scheduler_err)?;

    Ok(Json(CreateReminderResponse {
        id: reminder.id,
        kind: kind_name(&reminder.kind).to_string(),
        trigger_at: reminder.trigger_at(),
        cron_expression: reminder.cron_expression().map(str::to_string),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListRemindersQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListRemindersResponse {
    pub items: Vec<ReminderListItem>,
}

pub async fn list_reminders(
    State(state): State<ApiState>,
    Query(q): Query<ListRemindersQuery>,
) -> Result<Json<ListRemindersResponse>, (StatusCode, String)> {
    let status = match q.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(s) => Some(
            s.parse::<ReminderStatus>()
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
    };

    let items = state
        .scheduler
        .store()
        .list(status, q.limit.unwrap_or(100))
        .await
        .map_err(internal_err)?;

    Ok(Json(ListRemindersResponse {
        items: items.into_iter().map(ReminderListItem::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub total: i64,
    pub scheduler_running: bool,
    pub armed_recurring: usize,
}

pub async fn reminder_stats(
    State(state): State<ApiState>,
) -> Result<Json<StatsResponse>, (StatusCode, String)> {
    let counts = state
        .scheduler
        .store()
        .count_by_status()
        .await
        .map_err(internal_err)?;

    Ok(Json(StatsResponse {
        total: counts.total(),
        counts,
        scheduler_running: state.scheduler.is_running(),
        armed_recurring: state.scheduler.armed_cron_count(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: Uuid,
    pub cancelled: bool,
}

pub async fn cancel_reminder(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, (StatusCode, String)> {
    let cancelled = state
        .scheduler
        .cancel_reminder(id)
        .await
        .map_err(scheduler_err)?;

    Ok(Json(CancelResponse { id, cancelled }))
}

pub async fn list_jobs(State(state): State<ApiState>) -> Json<Vec<JobStatus>> {
    Json(state.triggers.statuses())
}

pub async fn trigger_job(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<JobStatus>, (StatusCode, String)> {
    let status = state.triggers.trigger(&name).await.map_err(trigger_err)?;
    Ok(Json(status))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
