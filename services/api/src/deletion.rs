//! Deferred removal of accounts whose email was never confirmed
//!
//! Every registration schedules a single-shot deletion at the expiry of its
//! verification code. A successful verification cancels it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::repositories::{Store, StoreError, StoreResult};

struct PendingDeletion {
    deadline_unix: i64,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingDeletion>>>;

/// Cancellable queue of delayed deletions, at most one per email
#[derive(Clone)]
pub struct DeferredDeletions {
    store: Arc<dyn Store>,
    pending: PendingMap,
}

impl DeferredDeletions {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Delete `email` at `deadline_unix` unless it is confirmed by then.
    /// Replaces any deletion already pending for the same email.
    pub fn schedule(&self, email: &str, deadline_unix: i64, now_unix: i64) {
        let delay = Duration::from_secs(deadline_unix.saturating_sub(now_unix).max(0) as u64);
        let store = self.store.clone();
        let pending = self.pending.clone();
        let owned_email = email.to_string();

        // held across the spawn: the task must not see the map before its
        // own entry is in place
        let mut queue = match self.pending.lock() {
            Ok(queue) => queue,
            Err(e) => {
                error!("Deferred deletion queue is poisoned: {}", e);
                return;
            }
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            delete_if_unconfirmed(store.as_ref(), &owned_email).await;

            if let Ok(mut pending) = pending.lock() {
                if pending
                    .get(&owned_email)
                    .is_some_and(|entry| entry.deadline_unix == deadline_unix)
                {
                    pending.remove(&owned_email);
                }
            }
        });

        let previous = queue.insert(
            email.to_string(),
            PendingDeletion {
                deadline_unix,
                handle,
            },
        );
        drop(queue);

        if let Some(previous) = previous {
            previous.handle.abort();
        }
        info!("Scheduled deletion of {} at {} unless verified", email, deadline_unix);
    }

    /// Drop the pending deletion for `email`; true if one was pending
    pub fn cancel(&self, email: &str) -> bool {
        let removed = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(email));

        match removed {
            Some(entry) => {
                entry.handle.abort();
                info!("Cancelled pending deletion of {}", email);
                true
            }
            None => false,
        }
    }

    /// Deadline of the deletion pending for `email`, if any
    pub fn pending_deadline(&self, email: &str) -> Option<i64> {
        self.pending
            .lock()
            .ok()?
            .get(email)
            .map(|entry| entry.deadline_unix)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild the queue after a restart from the unconfirmed accounts in the
    /// store. Accounts past their deadline, or without any code, go at once.
    pub async fn restore(&self, now_unix: i64) -> StoreResult<usize> {
        let users = self.store.get_unconfirmed_users().await?;
        let mut scheduled = 0;

        for user in users {
            match self.store.get_latest_verification(&user.email).await {
                Ok(latest) if latest.expires_unix() > now_unix => {
                    self.schedule(&user.email, latest.deletion_deadline(), now_unix);
                    scheduled += 1;
                }
                Ok(_) | Err(StoreError::NotFound) => {
                    delete_if_unconfirmed(self.store.as_ref(), &user.email).await;
                }
                Err(e) => {
                    warn!("Failed to restore pending deletion of {}: {}", user.email, e);
                }
            }
        }

        info!("Restored {} pending deletions", scheduled);
        Ok(scheduled)
    }
}

/// Idempotent: confirmed or already removed accounts are left alone
pub async fn delete_if_unconfirmed(store: &dyn Store, email: &str) {
    match store.delete_unverified_user_cascade(email).await {
        Ok(true) => info!("Deleted unverified account {}", email),
        Ok(false) => {}
        Err(e) => error!("Failed to delete unverified account {}: {}", email, e),
    }
}
