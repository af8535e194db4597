//! Cache Warmer
//!
//! Pre-populates both tiers with known-hot rows from the source of truth.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::CacheFacade;

// == Warm Row ==
/// One row fetched by a loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmRow {
    pub id: String,
    pub value: Value,
}

impl WarmRow {
    pub fn new(id: impl ToString, value: Value) -> Self {
        Self {
            id: id.to_string(),
            value,
        }
    }
}

// == Entity Loader ==
/// Source-of-truth query returning a bounded batch of hot rows for one entity
/// type.
#[async_trait]
pub trait EntityLoader: Send + Sync {
    /// Entity tag; keys are built as `<entity>_<id>`.
    fn entity(&self) -> &str;

    async fn load(&self) -> anyhow::Result<Vec<WarmRow>>;
}

/// Key under which a warmed row is cached.
pub fn warm_key(entity: &str, id: &str) -> String {
    format!("{}_{}", entity, id)
}

// == Warmer ==
#[derive(Debug, Clone)]
pub struct Warmer {
    batch_limit: usize,
}

impl Warmer {
    pub fn new(batch_limit: usize) -> Self {
        Self { batch_limit }
    }

    /// Runs every loader, isolating failures. Returns true if at least one
    /// loader succeeded.
    pub async fn warm(&self, cache: &CacheFacade, loaders: &[Arc<dyn EntityLoader>]) -> bool {
        if loaders.is_empty() {
            debug!("Cache warming skipped: no loaders");
            return false;
        }

        let mut succeeded = 0;
        let mut rows_written = 0;
        for loader in loaders {
            let entity = loader.entity();
            let mut rows = match loader.load().await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(entity, error = %err, "Cache warm loader failed");
                    continue;
                }
            };

            if rows.len() > self.batch_limit {
                warn!(
                    entity,
                    rows = rows.len(),
                    limit = self.batch_limit,
                    "Truncating warm batch"
                );
                rows.truncate(self.batch_limit);
            }

            let entries = rows
                .into_iter()
                .map(|row| (warm_key(entity, &row.id), row.value));
            let written = cache.set_multiple(entries, None).await;

            info!(entity, rows = written, "Warmed cache");
            succeeded += 1;
            rows_written += written;
        }

        info!(
            loaders = loaders.len(),
            succeeded,
            rows = rows_written,
            "Cache warming finished"
        );
        succeeded > 0
    }
}
