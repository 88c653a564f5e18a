use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ark_ec::CurveGroup;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{
    ExecuteStep, OrderingError, OrderingService, Snapshot, Transaction, TransactionPool,
    TransactionResult,
};
use crate::contract::FormContract;
use crate::crypto::elgamal::PointEmbedding;

const LOG_TARGET: &str = "mixtally::ordering::memory";
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Buffered view over the shared KV map. Reads see committed state plus own
/// writes; writes only reach the map on commit, so a failed command leaves no
/// trace.
pub struct DeltaSnapshot<'a> {
    base: &'a DashMap<Vec<u8>, Vec<u8>>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> DeltaSnapshot<'a> {
    fn new(base: &'a DashMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    fn commit(self) {
        for (key, value) in self.writes {
            match value {
                Some(value) => {
                    self.base.insert(key, value);
                }
                None => {
                    self.base.remove(&key);
                }
            }
        }
    }
}

impl Snapshot for DeltaSnapshot<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, OrderingError> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self.base.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), OrderingError> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), OrderingError> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }
}

/// Single-process ordering backend: a dashmap-backed KV store, sequential
/// execution of pooled transactions through the form contract, and a
/// broadcast channel streaming commit results to watchers. Backs the
/// integration tests and local single-node runs.
pub struct MemoryOrdering<C: CurveGroup + PointEmbedding> {
    store: DashMap<Vec<u8>, Vec<u8>>,
    contract: FormContract<C>,
    execution: Mutex<()>,
    events: broadcast::Sender<TransactionResult>,
    index: AtomicU64,
}

impl<C> MemoryOrdering<C>
where
    C: CurveGroup + PointEmbedding,
{
    pub fn new(contract: FormContract<C>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: DashMap::new(),
            contract,
            execution: Mutex::new(()),
            events,
            index: AtomicU64::new(0),
        }
    }

    /// Seed a raw value, e.g. the roster record under `roster_key`.
    pub fn seed(&self, key: &[u8], value: Vec<u8>) {
        self.store.insert(key.to_vec(), value);
    }

    /// Order and execute one transaction, broadcasting its commit result.
    /// The execution lock linearizes transactions like the consensus layer
    /// would.
    pub fn submit(&self, tx: Transaction) -> TransactionResult {
        let _guard = self.execution.lock();

        let mut snapshot = DeltaSnapshot::new(&self.store);
        let step = ExecuteStep {
            current: tx.clone(),
        };

        let result = match self.contract.execute(&mut snapshot, &step) {
            Ok(()) => {
                snapshot.commit();
                self.index.fetch_add(1, Ordering::Relaxed);
                TransactionResult {
                    tx_id: tx.id,
                    accepted: true,
                    message: String::new(),
                }
            }
            Err(err) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    tx_id = %hex::encode(&tx.id),
                    reason = %err,
                    "transaction rejected"
                );
                TransactionResult {
                    tx_id: tx.id,
                    accepted: false,
                    message: err.to_string(),
                }
            }
        };

        // Nobody watching is fine.
        let _ = self.events.send(result.clone());
        result
    }
}

impl<C> OrderingService for MemoryOrdering<C>
where
    C: CurveGroup + PointEmbedding,
{
    fn get_proof(&self, key: &[u8]) -> Result<Option<Vec<u8>>, OrderingError> {
        Ok(self.store.get(key).map(|entry| entry.value().clone()))
    }

    fn get_index(&self) -> u64 {
        self.index.load(Ordering::Relaxed)
    }

    fn watch(&self) -> broadcast::Receiver<TransactionResult> {
        self.events.subscribe()
    }
}

impl<C> TransactionPool for MemoryOrdering<C>
where
    C: CurveGroup + PointEmbedding,
{
    fn add(&self, tx: Transaction) -> Result<(), OrderingError> {
        self.submit(tx);
        Ok(())
    }
}
