//! Chat safety: message and response screening plus per-user rate limits.

pub mod guard;
pub mod rate_limit;

pub use guard::{ChatSecurityGuard, InjectionCategory, Rejection, RejectionReason};
pub use rate_limit::{Clock, ManualClock, RateLimited, RateLimiter, SystemClock};
