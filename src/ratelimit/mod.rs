//! Rate limiting decisions.

mod key;
mod limiter;
mod policy;

pub use key::{KeyKind, RateKey};
pub use limiter::{Decision, RateLimiter};
pub use policy::{LimitPolicy, Policies, MAX_DURATION};

pub(crate) use policy::check_duration;
