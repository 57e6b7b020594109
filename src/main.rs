mod alert;
mod housekeeping;

use alert::AlertDispatcher;
use tether::api;
use tether::config;
use tether::db;
use tether::reminders::{ReminderRepo, ReminderScheduler};
use tether::trigger::TriggerService;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tetherd=info,tether=info")),
        )
        .init();

    let cfg = config::Config::from_env()?;
    let api_addr = cfg.admin_addr.clone();

    info!(
        database_url = %cfg.database_url,
        poll_interval_secs = cfg.poll_interval.as_secs(),
        api = %api_addr.as_deref().unwrap_or("disabled"),
        alert_command = cfg.alert_command.is_some(),
        migrate_on_startup = cfg.migrate_on_startup,
        purge_after_days = cfg.purge_after_days,
        "tetherd starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let scheduler =
        ReminderScheduler::new(ReminderRepo::new(pool.clone())).with_poll_interval(cfg.poll_interval);

    let dispatcher = AlertDispatcher::new(cfg.alert_command.clone());
    scheduler.set_alert_handler(move |reminder| {
        let dispatcher = dispatcher.clone();
        async move { dispatcher.deliver(&reminder).await }
    });

    let triggers = TriggerService::new();
    housekeeping::register_jobs(&triggers, &cfg, pool.clone(), scheduler.clone())?;

    scheduler.start().await?;
    triggers.start();

    // ---- API task ----
    let app = api::router(api::ApiState {
        scheduler: scheduler.clone(),
        triggers: triggers.clone(),
        default_channel: cfg.default_channel.clone(),
    });
    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("admin api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutdown requested");
        }
        res = api_handle => match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("admin api failed: {e:#}"),
            Err(e) => error!("admin api task crashed: {e}"),
        },
    }

    triggers.shutdown();
    scheduler.stop();
    pool.close().await;
    info!("tetherd stopped");

    Ok(())
}
