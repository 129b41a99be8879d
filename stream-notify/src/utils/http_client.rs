use std::{sync::OnceLock, time::Duration};

use tracing::debug;

/// Timeout applied to every Discord REST call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another component got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the shared HTTP client used for REST calls.
pub fn build_client(user_agent: &str) -> crate::Result<reqwest::Client> {
    install_rustls_provider();
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}
