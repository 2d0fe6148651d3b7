//! Inbound entry points called by the webhook gateway

mod query;
mod relay;

pub use query::RateQuery;
pub use relay::ContentRelay;
