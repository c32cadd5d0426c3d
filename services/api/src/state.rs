//! Application state shared across handlers

use common::mail::Mailer;
use std::sync::Arc;

use crate::{
    config::AppConfig, deletion::DeferredDeletions, rate_limiter::RateLimiter,
    repositories::Store, verification::VerificationIssuer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
    pub verifications: VerificationIssuer,
    pub deletions: DeferredDeletions,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wire the collaborators around one store handle
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, config: AppConfig) -> Self {
        let verifications = VerificationIssuer::new(
            store.clone(),
            config.verification.code_length,
            config.verification.life_seconds,
        );
        let deletions = DeferredDeletions::new(store.clone());

        Self {
            store,
            mailer,
            config: Arc::new(config),
            verifications,
            deletions,
            rate_limiter: RateLimiter::default(),
        }
    }

    /// Whether logins require a confirmed email
    pub fn verification_enabled(&self) -> bool {
        self.config.verification.enabled
    }
}
