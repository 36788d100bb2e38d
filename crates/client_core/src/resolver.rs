use std::sync::Arc;

use anyhow::Result;
use shared::protocol::ContactQuery;
use tracing::debug;

use crate::{directory::ContactDirectory, gateway::Gateway};

/// Upper bound on identifiers per batch-fetch gateway call.
pub const BATCH_LIMIT: usize = 50;

/// Fetches full records for unresolved identifiers in bounded batches and
/// merges them into the directory.
pub struct BatchResolver {
    gateway: Arc<dyn Gateway>,
    directory: Arc<ContactDirectory>,
}

impl BatchResolver {
    pub fn new(gateway: Arc<dyn Gateway>, directory: Arc<ContactDirectory>) -> Self {
        Self { gateway, directory }
    }

    /// Resolves every query, issuing one gateway call per chunk of at most
    /// `BATCH_LIMIT`. A failed gateway call propagates; chunks are never
    /// dropped silently.
    pub async fn resolve(&self, queries: &[ContactQuery]) -> Result<()> {
        for chunk in queries.chunks(BATCH_LIMIT) {
            let records = self.gateway.batch_fetch_contacts(chunk).await?;
            debug!(
                "contact batch resolved requested={} returned={}",
                chunk.len(),
                records.len()
            );
            for record in &records {
                self.directory.merge_record(record).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
