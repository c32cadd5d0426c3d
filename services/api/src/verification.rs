//! Verification issuer: numeric email codes with a bounded lifetime

use common::mail::Email;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    models::{NewVerification, Verification},
    repositories::{Store, StoreResult},
};

pub const VERIFICATION_SUBJECT: &str = "Email verification";

/// Outcome of comparing a submitted code with the latest issued one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Mismatch,
    Expired,
}

/// `length` random digits, leading zeros allowed
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Exact string comparison first, then the lifetime
pub fn check_against(verification: &Verification, submitted: &str, now: i64) -> CodeCheck {
    if submitted != verification.code {
        CodeCheck::Mismatch
    } else if verification.is_expired_at(now) {
        CodeCheck::Expired
    } else {
        CodeCheck::Valid
    }
}

#[derive(Clone)]
pub struct VerificationIssuer {
    store: Arc<dyn Store>,
    code_length: usize,
    life_seconds: i64,
}

impl VerificationIssuer {
    pub fn new(store: Arc<dyn Store>, code_length: usize, life_seconds: i64) -> Self {
        Self {
            store,
            code_length,
            life_seconds,
        }
    }

    pub fn life_seconds(&self) -> i64 {
        self.life_seconds
    }

    /// Issue and persist a fresh code. Earlier codes stay in the store but
    /// are shadowed by this one.
    pub async fn issue_code(&self, email: &str, now: i64) -> StoreResult<Verification> {
        let verification = self
            .store
            .create_verification(&NewVerification {
                email: email.to_string(),
                code: generate_code(self.code_length),
                issued_unix: now,
                life_seconds: self.life_seconds,
            })
            .await?;

        info!(
            "Issued verification code for {} valid until {}",
            email,
            verification.expires_unix()
        );
        Ok(verification)
    }

    /// Check `submitted` against the latest code issued for `email`
    pub async fn check_code(&self, email: &str, submitted: &str, now: i64) -> StoreResult<CodeCheck> {
        let latest = self.store.get_latest_verification(email).await?;
        let outcome = check_against(&latest, submitted, now);
        if outcome != CodeCheck::Valid {
            warn!("Verification for {} failed: {:?}", email, outcome);
        }
        Ok(outcome)
    }
}

/// The message carrying a verification code to its owner
pub fn verification_email(sender: &str, verification: &Verification) -> Email {
    let hours = verification.life_seconds as f64 / 3600.0;
    Email::new(
        sender,
        vec![verification.email.clone()],
        VERIFICATION_SUBJECT,
        format!(
            "<p>Your email verification code: <b>{}</b></p>\
             <p>Please, verify your email in {:.1} hours.</p>\
             <p>This email was specified during account creation. Ignore this message if it wasn't you.</p>",
            verification.code, hours
        ),
    )
}
