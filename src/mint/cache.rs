//! Per-endpoint mint connectivity cache
//!
//! The first redemption against a mint performs an info round-trip; later
//! redemptions reuse the stored result. Concurrent first uses may both hit
//! the mint, which is harmless because populating is idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{MintClient, MintError, MintInfo};

/// Caches successful `get_info` results keyed by mint URL
pub struct MintCache {
    client: Arc<dyn MintClient>,
    infos: RwLock<HashMap<String, MintInfo>>,
}

impl MintCache {
    pub fn new(client: Arc<dyn MintClient>) -> Self {
        Self {
            client,
            infos: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped client, for operations that are never cached
    pub fn client(&self) -> &Arc<dyn MintClient> {
        &self.client
    }

    /// Return cached info, connecting to the mint on first use
    pub async fn ensure(&self, mint_url: &str) -> Result<MintInfo, MintError> {
        if let Some(info) = self.infos.read().await.get(mint_url) {
            debug!(mint = %mint_url, "mint info cache hit");
            return Ok(info.clone());
        }

        let info = self.client.get_info(mint_url).await?;
        info!(
            mint = %mint_url,
            name = info.name.as_deref().unwrap_or("unknown"),
            "connected to mint"
        );

        self.infos
            .write()
            .await
            .entry(mint_url.to_string())
            .or_insert_with(|| info.clone());

        Ok(info)
    }

    /// Drop a cached entry so the next use reconnects
    pub async fn invalidate(&self, mint_url: &str) {
        self.infos.write().await.remove(mint_url);
    }

    pub async fn len(&self) -> usize {
        self.infos.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.infos.read().await.is_empty()
    }
}
