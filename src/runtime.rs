//! Shared runtime state (spec §9 "Global mutable state → explicit
//! instance"). Owns everything that would otherwise live behind a
//! module-scope global or a lazily-initialized static: the ledger
//! handle, the live block subscription, and the entropy source used at
//! audit time. Every component that needs one of these takes `&Runtime`
//! or a clone of a piece of it via constructor injection — nothing here
//! is reached through a global.

use crate::entropy::{BlockHashSource, ExternalEntropySource, NoopEntropySource, SessionBlockHashSource};
use crate::ledger::LedgerAdapter;
use std::sync::Arc;

pub struct Runtime {
    pub ledger: Arc<dyn LedgerAdapter>,
    pub block_hashes: Arc<dyn BlockHashSource>,
    pub entropy_source: Arc<dyn ExternalEntropySource>,
}

impl Runtime {
    /// Build a runtime around a ledger adapter, using the in-process
    /// session block feed and a no-op entropy source by default.
    pub fn new(ledger: Arc<dyn LedgerAdapter>) -> Self {
        Self {
            ledger,
            block_hashes: Arc::new(SessionBlockHashSource::new()),
            entropy_source: Arc::new(NoopEntropySource),
        }
    }

    pub fn with_block_hash_source(mut self, source: Arc<dyn BlockHashSource>) -> Self {
        self.block_hashes = source;
        self
    }

    pub fn with_entropy_source(mut self, source: Arc<dyn ExternalEntropySource>) -> Self {
        self.entropy_source = source;
        self
    }

    /// Release the live block subscription. Does not tear down the
    /// ledger adapter itself — callers that own the adapter are
    /// responsible for its lifecycle.
    pub async fn shutdown(self) {
        self.block_hashes.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, SendRequest};
    use crate::types::{Hash256, UtxoEntry};
    use async_trait::async_trait;

    struct StubLedger;

    #[async_trait]
    impl LedgerAdapter for StubLedger {
        async fn manual_send(&self, _req: SendRequest<'_>) -> Result<Hash256, LedgerError> {
            Ok([0u8; 32])
        }
        async fn get_utxos(&self, _address: &str) -> Result<Vec<UtxoEntry>, LedgerError> {
            Ok(Vec::new())
        }
        async fn split_utxos(&self, _address: &str, _split_count: usize) -> Result<Hash256, LedgerError> {
            Ok([0u8; 32])
        }
        async fn consolidate_utxos(&self, _address: &str, _target_count: usize) -> Result<Hash256, LedgerError> {
            Ok([0u8; 32])
        }
        async fn walk_dag_range(
            &self,
            _start_hash: Hash256,
            _end_hash: Hash256,
            _prefixes: &[[u8; 4]],
        ) -> Result<Vec<(Hash256, Vec<u8>)>, LedgerError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn runtime_shuts_down_cleanly() {
        let runtime = Runtime::new(Arc::new(StubLedger));
        runtime.shutdown().await;
    }
}
