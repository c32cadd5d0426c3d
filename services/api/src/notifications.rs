//! Notification scheduler: periodic due-date reminders by email

use common::mail::{Email, Mailer};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::{
    models::{Todo, display_unix, now_unix},
    repositories::{Store, StoreResult},
};

pub const NOTIFICATION_SUBJECT: &str = "TODO Notification";

/// What one sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub users_checked: usize,
    pub emails_sent: usize,
    pub failures: usize,
}

/// Escape text placed inside an HTML body
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Summary email for a non-empty list of due todos, soonest first
pub fn notification_email(sender: &str, recipient: &str, todos: &[Todo]) -> Option<Email> {
    let first = todos.first()?;
    let mut body = format!(
        "<p>Notifying you on your \"{}\" TODO.</p><p>Due date is {}</p>",
        escape_html(&first.text),
        display_unix(first.due_unix)
    );
    if todos.len() > 1 {
        body.push_str(&format!(
            "<p>There are also {} other TODOs nearing Due date.</p>",
            todos.len() - 1
        ));
    }

    Some(Email::new(
        sender,
        vec![recipient.to_string()],
        NOTIFICATION_SUBJECT,
        body,
    ))
}

#[derive(Clone)]
pub struct NotificationScheduler {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    sender: String,
    window_secs: i64,
}

impl NotificationScheduler {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, sender: impl Into<String>, window_secs: i64) -> Self {
        Self {
            store,
            mailer,
            sender: sender.into(),
            window_secs,
        }
    }

    /// One sweep over every opted-in user. Only a failure to list the users
    /// aborts the sweep; per-user failures are logged and counted.
    pub async fn run_tick(&self, now: i64) -> StoreResult<TickReport> {
        let users = self.store.get_users_with_notifications_on().await?;
        let horizon = now.saturating_add(self.window_secs);
        let mut report = TickReport::default();

        for user in users {
            report.users_checked += 1;

            let due = match self.store.get_user_todos_due_by(&user.email, horizon).await {
                Ok(due) => due,
                Err(e) => {
                    error!("Failed to fetch due todos of {}: {}", user.email, e);
                    report.failures += 1;
                    continue;
                }
            };

            let Some(email) = notification_email(&self.sender, &user.email, &due) else {
                continue;
            };

            info!("Notifying {} with {} TODOs", user.email, due.len());
            match self.mailer.send(&email).await {
                Ok(()) => report.emails_sent += 1,
                Err(e) => {
                    error!("Failed to notify {}: {}", user.email, e);
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }

    async fn run_logged(&self) {
        match self.run_tick(now_unix()).await {
            Ok(report) => info!(
                "Notification sweep done: {} users checked, {} emails sent, {} failures",
                report.users_checked, report.emails_sent, report.failures
            ),
            Err(e) => error!("Failed to retrieve users with notifications on: {}", e),
        }
    }

    /// Register the sweep with a fresh scheduler: once right away, then
    /// every `interval`. The caller owns shutdown.
    pub async fn start(&self, interval: Duration) -> anyhow::Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;

        let first = self.clone();
        let startup_job = Job::new_one_shot_async(Duration::from_secs(0), move |_, _| {
            let notifier = first.clone();
            Box::pin(async move {
                notifier.run_logged().await;
            })
        })?;

        let repeated = self.clone();
        let job = Job::new_repeated_async(interval, move |_, _| {
            let notifier = repeated.clone();
            Box::pin(async move {
                notifier.run_logged().await;
            })
        })?;

        scheduler.add(startup_job).await?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started notification scheduler every {:?}", interval);
        Ok(scheduler)
    }
}
