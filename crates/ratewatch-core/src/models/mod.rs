//! Data models for RateWatch

mod notification;
mod rate;
mod rule;

pub use notification::*;
pub use rate::*;
pub use rule::*;
