use chrono::{Duration, Utc};

mod common;
use common::{insert_finished, setup_db};

use tether::reminders::{MaintenanceRepo, ReminderRepo};

#[tokio::test]
async fn purges_only_old_finished_reminders() {
    let pool = setup_db().await;

    let repo = ReminderRepo::new(pool.clone());
    let maint = MaintenanceRepo::new(pool.clone());

    let old = Utc::now() - Duration::days(45);
    let recent = Utc::now() - Duration::days(2);
    let cutoff = Utc::now() - Duration::days(30);

    let old_done = insert_finished(&pool, "completed", old).await;
    let old_cancelled = insert_finished(&pool, "cancelled", old).await;
    let recent_done = insert_finished(&pool, "completed", recent).await;

    // Pending reminders are never purged, however old their trigger time.
    let pending = repo
        .create_once("still waiting", old, "notification")
        .await
        .unwrap();
    let recurring = repo
        .create_recurring("weekly", "0 9 * * 1", "notification")
        .await
        .unwrap();

    let deleted = maint.purge_finished_older_than(cutoff).await.unwrap();
    assert_eq!(deleted, 2);

    assert!(repo.get(old_done).await.unwrap().is_none());
    assert!(repo.get(old_cancelled).await.unwrap().is_none());
    assert!(repo.get(recent_done).await.unwrap().is_some());
    assert!(repo.get(pending).await.unwrap().is_some());
    assert!(repo.get(recurring).await.unwrap().is_some());

    // Nothing left to purge.
    assert_eq!(maint.purge_finished_older_than(cutoff).await.unwrap(), 0);
}

#[tokio::test]
async fn vacuum_succeeds_after_purge() {
    let pool = setup_db().await;
    let maint = MaintenanceRepo::new(pool.clone());

    insert_finished(&pool, "completed", Utc::now() - Duration::days(90)).await;
    maint
        .purge_finished_older_than(Utc::now() - Duration::days(30))
        .await
        .unwrap();

    maint.vacuum().await.unwrap();
}
