use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::time::Duration;

mod common;
use common::setup_db;

use tether::api::{
    cancel_reminder, create_reminder, list_reminders, reminder_stats, trigger_job, ApiState,
    CreateReminderRequest, ListRemindersQuery,
};
use tether::reminders::{ReminderRepo, ReminderScheduler};
use tether::trigger::{JobOptions, TriggerService};

async fn state() -> ApiState {
    let pool = setup_db().await;
    ApiState {
        scheduler: ReminderScheduler::new(ReminderRepo::new(pool)),
        triggers: TriggerService::new(),
        default_channel: "notification".into(),
    }
}

fn request(message: &str, when: &str, channel: Option<&str>) -> Json<CreateReminderRequest> {
    Json(CreateReminderRequest {
        message: message.into(),
        when: when.into(),
        channel: channel.map(str::to_string),
    })
}

#[tokio::test]
async fn create_list_and_cancel() {
    let st = state().await;

    let Json(once) = create_reminder(State(st.clone()), request("tea", "in 10 minutes", None))
        .await
        .unwrap();
    assert_eq!(once.kind, "once");
    assert!(once.trigger_at.is_some());

    let Json(weekly) = create_reminder(
        State(st.clone()),
        request("bins", "every monday at 7am", Some("sms")),
    )
    .await
    .unwrap();
    assert_eq!(weekly.kind, "recurring");
    assert_eq!(weekly.cron_expression.as_deref(), Some("0 7 * * 1"));

    let Json(list) = list_reminders(
        State(st.clone()),
        Query(ListRemindersQuery {
            status: Some("pending".into()),
            limit: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(list.items.len(), 2);
    let bins = list.items.iter().find(|r| r.id == weekly.id).unwrap();
    assert_eq!(bins.channel, "sms");
    assert!(bins.next_fire.is_some());
    let tea = list.items.iter().find(|r| r.id == once.id).unwrap();
    assert_eq!(tea.channel, "notification");

    let Json(res) = cancel_reminder(State(st.clone()), Path(once.id)).await.unwrap();
    assert!(res.cancelled);
    let Json(res) = cancel_reminder(State(st.clone()), Path(once.id)).await.unwrap();
    assert!(!res.cancelled);

    let Json(stats) = reminder_stats(State(st.clone())).await.unwrap();
    assert_eq!(stats.counts.pending, 1);
    assert_eq!(stats.counts.cancelled, 1);
    assert_eq!(stats.total, 2);
}

#[tokio::test]
async fn bad_input_is_a_client_error() {
    let st = state().await;

    let (code, msg) = create_reminder(State(st.clone()), request("x", "whenever", None))
        .await
        .unwrap_err();
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(msg.contains("whenever"));

    let (code, _) = create_reminder(State(st.clone()), request("  ", "in 1 hour", None))
        .await
        .unwrap_err();
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = list_reminders(
        State(st.clone()),
        Query(ListRemindersQuery {
            status: Some("snoozed".into()),
            limit: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trigger_endpoint_runs_known_jobs_only() {
    let st = state().await;
    st.triggers
        .register(
            "noop",
            JobOptions::new(Duration::from_secs(60), || async { anyhow::Ok(()) }),
        )
        .unwrap();

    let Json(status) = trigger_job(State(st.clone()), Path("noop".into()))
        .await
        .unwrap();
    assert_eq!(status.run_count, 1);

    let (code, _) = trigger_job(State(st.clone()), Path("nope".into()))
        .await
        .unwrap_err();
    assert_eq!(code, StatusCode::NOT_FOUND);

}
