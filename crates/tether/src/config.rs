use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://tether.db?mode=rwc";

// Runtime configuration for the daemon and the ctl tool.
// Values come from environment variables (a `.env` file is honoured).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub poll_interval: Duration,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub default_channel: String,
    pub purge_after_days: i64,
    pub housekeeping_interval: Duration,
    pub alert_command: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("TETHER_DATABASE_URL", "DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        if !database_url.starts_with("sqlite:") {
            anyhow::bail!("TETHER_DATABASE_URL must be a sqlite: url, got {database_url}");
        }

        let poll_interval_secs = env_parse::<u64>("TETHER_POLL_INTERVAL_SECS")
            .unwrap_or(60)
            .clamp(1, 3600);

        let admin_addr = env_non_empty("TETHER_ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("TETHER_MIGRATE_ON_STARTUP").unwrap_or(true);

        let default_channel = env_non_empty("TETHER_DEFAULT_CHANNEL")
            .unwrap_or_else(|| "notification".to_string());

        let purge_after_days = env_parse::<i64>("TETHER_PURGE_AFTER_DAYS")
            .unwrap_or(30)
            .max(1);

        let housekeeping_interval_secs = env_parse::<u64>("TETHER_HOUSEKEEPING_INTERVAL_SECS")
            .unwrap_or(300)
            .max(1);

        let alert_command = env_non_empty("TETHER_ALERT_COMMAND");

        Ok(Self {
            database_url,
            poll_interval: Duration::from_secs(poll_interval_secs),
            admin_addr,
            migrate_on_startup,
            default_channel,
            purge_after_days,
            housekeeping_interval: Duration::from_secs(housekeeping_interval_secs),
            alert_command,
        })
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    env_non_empty(primary).or_else(|| env_non_empty(fallback))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_non_empty(key).and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
