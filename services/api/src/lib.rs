//! Multi-user TODO service
//!
//! Accounts are confirmed by emailed codes, every protected request passes
//! the authorization gate in [`auth`], and [`notifications`] mails due-date
//! reminders on a timer.

pub mod auth;
pub mod config;
pub mod deletion;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod validation;
pub mod verification;

pub use routes::create_router;
pub use state::AppState;
