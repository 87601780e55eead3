use super::Backend;
use crate::output;
use afterlife_chain::{PublishRequest, Publisher};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;

pub async fn publish(
    backend: &Backend,
    request_path: &Path,
    wait: u32,
    wait_delay_ms: u64,
    json: bool,
) -> Result<()> {
    let local = backend
        .local
        .as_ref()
        .ok_or_else(|| anyhow!("publish needs --ledger-file; no network uploader is configured"))?;

    let text = std::fs::read_to_string(request_path)
        .with_context(|| format!("failed to read {}", request_path.display()))?;
    let request: PublishRequest = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse publish request {}", request_path.display()))?;

    let publisher = Publisher::new(local.ledger.clone(), backend.query.clone(), backend.fetch.clone())
        .with_convergence(wait, Duration::from_millis(wait_delay_ms));

    // Persist whatever was uploaded, even if a later step failed.
    let result = publisher.publish(&request).await;
    backend.persist()?;
    let outcome = result?;

    if json {
        return output::print_json(&outcome);
    }
    output::print_publish_outcome(&outcome);
    Ok(())
}
