use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::entry::{AssetEntry, Codec};
use crate::error::AssetError;
use crate::source::{AssetSource, Fetched};

/// Central cache of fetched audio bytes, keyed by URL.
///
/// Every URL gets one slot. Concurrent and repeated loads of the same URL
/// wait on that slot, so the underlying source is hit at most once per
/// successful load. A failed load leaves the slot empty and the next caller
/// retries.
pub struct AssetCache {
    source: Arc<dyn AssetSource>,
    slots: Mutex<HashMap<String, Arc<OnceCell<Arc<AssetEntry>>>>>,
}

impl AssetCache {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Probe, fetch and memoize the asset at `url`.
    pub async fn load(&self, url: &str) -> Result<Arc<AssetEntry>, AssetError> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(url.to_string()).or_default())
        };

        let entry = slot.get_or_try_init(|| self.fetch_entry(url)).await?;
        Ok(Arc::clone(entry))
    }

    async fn fetch_entry(&self, url: &str) -> Result<Arc<AssetEntry>, AssetError> {
        self.source.probe(url).await?;
        let Fetched { bytes, mime } = self.source.fetch(url).await?;
        let codec = Codec::infer(url, mime.as_deref(), &bytes)
            .ok_or_else(|| AssetError::UnsupportedFormat(url.to_string()))?;

        info!("Fetched {} ({} bytes, {})", url, bytes.len(), codec.mime());
        Ok(Arc::new(AssetEntry::new(url, codec, bytes)))
    }

    /// A resolved entry, if `url` has finished loading.
    pub fn get(&self, url: &str) -> Option<Arc<AssetEntry>> {
        self.slots
            .lock()
            .get(url)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry. Loads already in flight still complete for
    /// their callers but are no longer memoized.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        debug!("Clearing {} asset cache slots", slots.len());
        slots.clear();
    }
}
