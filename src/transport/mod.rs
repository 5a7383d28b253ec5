//! Resilient Request Layer
//!
//! Outbound HTTP for backend adapters: per-request timeout, retry on
//! transport failures and 429/5xx, exponential backoff.

pub mod request;

#[cfg(test)]
pub(crate) mod testing;

pub use request::{Auth, RequestPayload, ResilientClient, ResponseBody, RetryPolicy};
pub use reqwest::Method;
