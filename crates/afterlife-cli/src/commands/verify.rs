use super::Backend;
use crate::output;
use afterlife_chain::ChainVerifier;
use anyhow::{bail, Result};

fn verifier(backend: &Backend) -> ChainVerifier {
    ChainVerifier::new(backend.query.clone(), backend.fetch.clone())
}

pub async fn verify_self(backend: &Backend, self_id: &str, json: bool) -> Result<()> {
    let report = verifier(backend).verify_self(self_id).await;
    if json {
        output::print_json(&report)?;
    } else {
        output::print_chain_report(&report);
    }
    if !report.ok {
        bail!("verification failed for {self_id}");
    }
    Ok(())
}

pub async fn verify_tx(backend: &Backend, tx_id: &str, json: bool) -> Result<()> {
    let report = verifier(backend).verify_tx(tx_id).await;
    if json {
        output::print_json(&report)?;
    } else {
        output::print_document_report(&report);
    }
    if !report.ok {
        bail!("verification failed for {tx_id}");
    }
    Ok(())
}
