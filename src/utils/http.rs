// src/utils/http.rs

//! HTTP client utilities.

use reqwest::redirect::Policy;

use crate::error::Result;
use crate::models::ProberConfig;

/// Create a pooled asynchronous HTTP client for one probing cycle.
///
/// Every request made through the client is bounded by `timeout_secs`.
pub fn create_async_client(config: &ProberConfig) -> Result<reqwest::Client> {
    let redirect = if config.follow_redirects {
        Policy::default()
    } else {
        Policy::none()
    };

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .redirect(redirect)
        .build()?;
    Ok(client)
}
