use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tether::trigger::{JobOptions, TriggerError, TriggerService};

fn counting_job(interval: Duration, runs: Arc<AtomicUsize>) -> JobOptions {
    JobOptions::new(interval, move || {
        let runs = runs.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        }
    })
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[tokio::test]
async fn duplicate_registration_fails_and_keeps_the_original() {
    let svc = TriggerService::new();
    let runs = Arc::new(AtomicUsize::new(0));

    svc.register(
        "cleanup",
        counting_job(Duration::from_secs(60), runs.clone()).description("first"),
    )
    .unwrap();

    let err = svc
        .register(
            "cleanup",
            counting_job(Duration::from_secs(5), runs.clone()).description("second"),
        )
        .unwrap_err();
    assert_eq!(err, TriggerError::DuplicateJob("cleanup".into()));

    let status = svc.status("cleanup").unwrap();
    assert_eq!(status.description.as_deref(), Some("first"));
    assert_eq!(status.interval_ms, 60_000);
    assert_eq!(svc.job_names(), vec!["cleanup".to_string()]);
}

#[tokio::test]
async fn scheduled_runs_update_metadata() {
    let svc = TriggerService::new();
    let runs = Arc::new(AtomicUsize::new(0));
    svc.register("tick", counting_job(Duration::from_millis(20), runs.clone()))
        .unwrap();
    svc.start();

    wait_for(|| svc.status("tick").map(|s| s.run_count >= 2).unwrap_or(false)).await;
    svc.stop("tick");

    let status = svc.status("tick").unwrap();
    assert!(status.run_count >= 2);
    assert!(status.last_run.is_some());
    assert!(status.last_duration_ms.is_some());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn stop_then_start_preserves_run_metadata() {
    let svc = TriggerService::new();
    let runs = Arc::new(AtomicUsize::new(0));
    svc.register(
        "report",
        counting_job(Duration::from_secs(3600), runs.clone()).description("daily report"),
    )
    .unwrap();
    svc.start();

    svc.trigger("report").await.unwrap();
    let before = svc.status("report").unwrap();
    assert_eq!(before.run_count, 1);

    assert!(svc.stop("report"));
    let stopped = svc.status("report").unwrap();
    assert!(!stopped.enabled);
    assert!(!stopped.armed);
    assert_eq!(stopped.next_run, None);

    svc.start_job("report", false).unwrap();
    let after = svc.status("report").unwrap();
    assert!(after.enabled);
    assert!(after.armed);
    assert_eq!(after.run_count, 1);
    assert_eq!(after.last_run, before.last_run);
    assert_eq!(after.description.as_deref(), Some("daily report"));
    assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn immediate_start_runs_once_right_away() {
    let svc = TriggerService::new();
    let runs = Arc::new(AtomicUsize::new(0));
    svc.register(
        "warmup",
        counting_job(Duration::from_secs(3600), runs.clone()).immediate(true),
    )
    .unwrap();

    // Not before the service starts.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    svc.start();
    wait_for(|| runs.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn executions_of_one_job_never_overlap() {
    let svc = TriggerService::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (a, p) = (active.clone(), peak.clone());
    svc.register(
        "slow",
        JobOptions::new(Duration::from_millis(10), move || {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }),
    )
    .unwrap();
    svc.start();

    // Manual triggers racing the timer.
    let (r1, r2, r3) = tokio::join!(svc.trigger("slow"), svc.trigger("slow"), svc.trigger("slow"));
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    svc.stop_all();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(svc.status("slow").unwrap().run_count >= 3);
}

#[tokio::test]
async fn failing_job_records_error_and_stays_scheduled() {
    let svc = TriggerService::new();
    svc.register(
        "flaky",
        JobOptions::new(Duration::from_secs(3600), || async {
            Err::<(), _>(anyhow::anyhow!("upstream unavailable"))
        }),
    )
    .unwrap();
    svc.start();

    let status = svc.trigger("flaky").await.unwrap();
    let err = status.last_error.expect("error recorded");
    assert_eq!(err.message, "upstream unavailable");
    assert!(err.detail.contains("upstream unavailable"));
    assert_eq!(status.run_count, 1);
    assert!(status.armed);
    assert!(status.next_run.is_some());
}

#[tokio::test]
async fn panicking_job_is_recorded_like_a_failure() {
    let svc = TriggerService::new();
    svc.register(
        "boom",
        JobOptions::new(Duration::from_secs(3600), || async {
            if true {
                panic!("kaboom");
            }
            anyhow::Ok(())
        }),
    )
    .unwrap();

    let status = svc.trigger("boom").await.unwrap();
    let err = status.last_error.expect("panic recorded");
    assert!(err.message.contains("panicked"));
}

#[tokio::test]
async fn success_clears_previous_error() {
    let svc = TriggerService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    svc.register(
        "recovering",
        JobOptions::new(Duration::from_secs(3600), move || {
            let calls = c.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first attempt fails");
                }
                Ok(())
            }
        }),
    )
    .unwrap();

    assert!(svc.trigger("recovering").await.unwrap().last_error.is_some());
    let status = svc.trigger("recovering").await.unwrap();
    assert!(status.last_error.is_none());
    assert_eq!(status.run_count, 2);
}

#[tokio::test]
async fn update_interval_rearms_and_keeps_metadata() {
    let svc = TriggerService::new();
    let runs = Arc::new(AtomicUsize::new(0));
    svc.register("sync", counting_job(Duration::from_secs(3600), runs.clone()))
        .unwrap();
    svc.start();
    svc.trigger("sync").await.unwrap();

    svc.update_interval("sync", Duration::from_millis(20)).unwrap();
    let status = svc.status("sync").unwrap();
    assert_eq!(status.interval_ms, 20);
    assert!(status.armed);

    wait_for(|| runs.load(Ordering::SeqCst) >= 3).await;
    svc.stop("sync");

    assert_eq!(
        svc.update_interval("sync", Duration::ZERO),
        Err(TriggerError::InvalidInterval("sync".into()))
    );
}

#[tokio::test]
async fn missing_jobs() {
    let svc = TriggerService::new();

    // Teardown is idempotent.
    assert!(!svc.stop("ghost"));
    assert!(!svc.unregister("ghost"));

    let unknown = TriggerError::UnknownJob("ghost".into());
    assert_eq!(svc.trigger("ghost").await.unwrap_err(), unknown);
    assert_eq!(svc.start_job("ghost", true).unwrap_err(), unknown);
    assert_eq!(
        svc.update_interval("ghost", Duration::from_secs(1)).unwrap_err(),
        unknown
    );
    assert_eq!(svc.status("ghost").unwrap_err(), unknown);
}

#[tokio::test]
async fn unregister_forgets_the_job() {
    let svc = TriggerService::new();
    let runs = Arc::new(AtomicUsize::new(0));
    svc.register("temp", counting_job(Duration::from_millis(10), runs.clone()))
        .unwrap();
    svc.start();

    assert!(svc.unregister("temp"));
    assert!(svc.status("temp").is_err());
    assert!(svc.statuses().is_empty());

    // Name is free again.
    svc.register("temp", counting_job(Duration::from_secs(60), runs))
        .unwrap();
}

#[tokio::test]
async fn stop_all_and_shutdown() {
    let svc = TriggerService::new();
    for name in ["a", "b", "c"] {
        svc.register(name, counting_job(Duration::from_secs(60), Arc::new(AtomicUsize::new(0))))
            .unwrap();
    }
    svc.start();
    assert!(svc.statuses().iter().all(|s| s.armed));

    svc.stop_all();
    let statuses = svc.statuses();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| !s.armed && !s.enabled));
    assert_eq!(
        statuses.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );

    svc.shutdown();
    assert!(svc.statuses().is_empty());
    assert!(!svc.is_started());
}
