use anyhow::Context;
use tether::reminders::Reminder;
use tokio::process::Command;
use tracing::{debug, info};

/// Delivers fired reminders: always logged, and handed to an external
/// command when one is configured.
#[derive(Clone, Debug, Default)]
pub struct AlertDispatcher {
    command: Option<String>,
}

impl AlertDispatcher {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }

    pub async fn deliver(&self, reminder: &Reminder) -> anyhow::Result<()> {
        info!(
            id = %reminder.id,
            channel = %reminder.channel,
            message = %reminder.message,
            "REMINDER"
        );

        let Some(command) = &self.command else {
            return Ok(());
        };

        // Message travels through the environment, never through the shell line.
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("TETHER_REMINDER_ID", reminder.id.to_string())
            .env("TETHER_REMINDER_MESSAGE", &reminder.message)
            .env("TETHER_REMINDER_CHANNEL", &reminder.channel)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to spawn alert command {command:?}"))?;

        if !status.success() {
            anyhow::bail!("alert command {command:?} exited with {status}");
        }
        debug!(id = %reminder.id, "alert command finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::Utc;
    use tether::reminders::{ReminderKind, ReminderStatus};
    use uuid::Uuid;

    fn reminder(message: &str) -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            message: message.to_string(),
            kind: ReminderKind::Once { at: Utc::now() },
            channel: "notification".into(),
            status: ReminderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn logging_only_never_fails() {
        AlertDispatcher::new(None)
            .deliver(&reminder("stretch"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn command_sees_reminder_in_its_environment() {
        let cmd = r#"test "$TETHER_REMINDER_MESSAGE" = "it's 'quoted'; echo pwned" && test "$TETHER_REMINDER_CHANNEL" = notification"#;
        AlertDispatcher::new(Some(cmd.into()))
            .deliver(&reminder("it's 'quoted'; echo pwned"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let err = AlertDispatcher::new(Some("exit 3".into()))
            .deliver(&reminder("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit"));
    }
}
