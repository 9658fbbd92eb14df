//! Data-store reachability probe run at the start of every cycle.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument};
use url::Url;

use quarry_shared::{Config, QuarryError, Result};

/// Timeout for one probe request.
const PROBE_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for probe requests.
const USER_AGENT: &str = concat!("Quarry/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used for probing.
pub fn probe_client(verify_tls: bool) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| QuarryError::Network(format!("failed to build HTTP client: {e}")))
}

/// Verify every data store the enabled phases depend on answers `200 OK`.
///
/// The collection store is needed by collection, enrichment and studies; the
/// enrichment store by enrichment and studies.
#[instrument(skip_all)]
pub async fn check_stores(client: &Client, config: &Config) -> Result<()> {
    if config.phases.needs_collection_store() {
        probe(client, "collection", &config.collection_store).await?;
    }

    if config.phases.needs_enrichment_store() {
        probe(client, "enrichment", &config.enrichment_store).await?;
    }

    Ok(())
}

/// GET `url` and require status 200.
async fn probe(client: &Client, store: &str, url: &Url) -> Result<()> {
    debug!(store, %url, "probing data store");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| QuarryError::store_unavailable(store, url.as_str(), e.to_string()))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(QuarryError::store_unavailable(
            store,
            url.as_str(),
            format!("HTTP {status}"),
        ));
    }

    info!(store, %url, "data store reachable");
    Ok(())
}
