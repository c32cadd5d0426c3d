//! Email verification record

/// One issued verification code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub issued_unix: i64,
    pub life_seconds: i64,
}

impl Verification {
    pub fn expires_unix(&self) -> i64 {
        self.issued_unix.saturating_add(self.life_seconds)
    }

    /// A code is still usable at exactly `issued + life`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_unix()
    }

    /// First second at which the code is expired
    pub fn deletion_deadline(&self) -> i64 {
        self.expires_unix().saturating_add(1)
    }
}


#[derive(Debug, Clone)]
pub struct NewVerification {
    pub email: String,
    pub code: String,
    pub issued_unix: i64,
    pub life_seconds: i64,
}
