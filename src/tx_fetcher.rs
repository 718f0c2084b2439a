//! The collaborator that resolves a previous transaction by id.
//!
//! Fetching itself (HTTP, a local index, a test fixture) is the caller's
//! concern; this module only defines the seam and an at-most-once cache
//! around it. No HTTP client is pulled in here.

use crate::error::{Error, Result};
use crate::transaction::Tx;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

/// Resolves a transaction id to its parsed transaction.
pub trait FetchTransaction {
    fn fetch(&self, tx_id: &str, testnet: bool) -> Result<Tx>;
}

/// Wraps a [`FetchTransaction`] with a cache so a previous transaction
/// referenced by several inputs is only fetched once.
pub struct CachingFetcher<F> {
    inner: F,
    cache: Mutex<HashMap<String, Tx>>,
}

impl<F> fmt::Debug for CachingFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingFetcher")
            .field("cached", &self.cache.lock().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}

impl<F: FetchTransaction> CachingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    pub fn fetch(&self, tx_id: &str, testnet: bool) -> Result<Tx> {
        if let Some(tx) = self.cache.lock().expect("cache mutex poisoned").get(tx_id) {
            return Ok(tx.clone());
        }
        debug!(tx_id, "fetching previous transaction");
        let tx = self.inner.fetch(tx_id, testnet)?;
        let fetched_id = tx.id()?;
        if fetched_id != tx_id {
            return Err(Error::TxIdMismatch {
                requested: tx_id.to_string(),
                fetched: fetched_id,
            });
        }
        self.cache
            .lock()
            .expect("cache mutex poisoned")
            .insert(tx_id.to_string(), tx.clone());
        Ok(tx)
    }
}

impl<F: FetchTransaction> FetchTransaction for CachingFetcher<F> {
    fn fetch(&self, tx_id: &str, testnet: bool) -> Result<Tx> {
        self.fetch(tx_id, testnet)
    }
}
