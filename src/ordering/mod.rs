pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use ark_ec::CurveGroup;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::forms::FormId;

/// Errors surfaced by the consumed ordering-layer services.
#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("transaction pool rejected the transaction: {0}")]
    PoolRejected(String),
}

/// A signed transaction as delivered by the ordering layer. The id is the
/// SHA-256 of the identity, nonce and arguments, so resubmissions with a
/// fresh nonce get a fresh id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: Vec<u8>,
    pub identity: Vec<u8>,
    pub nonce: u64,
    pub args: BTreeMap<String, Vec<u8>>,
}

impl Transaction {
    pub fn new(identity: Vec<u8>, nonce: u64, args: BTreeMap<String, Vec<u8>>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&identity);
        hasher.update(nonce.to_be_bytes());
        for (key, value) in &args {
            hasher.update((key.len() as u32).to_be_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u32).to_be_bytes());
            hasher.update(value);
        }
        let id = hasher.finalize().to_vec();
        Self {
            id,
            identity,
            nonce,
            args,
        }
    }

    pub fn arg(&self, key: &str) -> Option<&[u8]> {
        self.args.get(key).map(Vec::as_slice)
    }
}

/// Commit outcome of one transaction, streamed to watchers.
#[derive(Clone, Debug)]
pub struct TransactionResult {
    pub tx_id: Vec<u8>,
    pub accepted: bool,
    pub message: String,
}

/// One execution step handed to the contract: the transaction being applied.
#[derive(Clone, Debug)]
pub struct ExecuteStep {
    pub current: Transaction,
}

/// Replicated KV view scoped to one transaction. Reads are
/// snapshot-consistent; writes become visible only if the step commits.
pub trait Snapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, OrderingError>;
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), OrderingError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), OrderingError>;
}

/// Read and watch access to the ordering service.
pub trait OrderingService: Send + Sync {
    /// Proven value under `key` in the latest committed state.
    fn get_proof(&self, key: &[u8]) -> Result<Option<Vec<u8>>, OrderingError>;

    /// Index of the latest committed block.
    fn get_index(&self) -> u64;

    /// Stream of transaction commit results. Subscribe before submitting to
    /// the pool, or the result may be missed.
    fn watch(&self) -> broadcast::Receiver<TransactionResult>;
}

/// Mempool handle. Adding a transaction does not guarantee inclusion.
pub trait TransactionPool: Send + Sync {
    fn add(&self, tx: Transaction) -> Result<(), OrderingError>;
}

/// Access-control subsystem consulted before every command dispatch.
pub trait AccessService: Send + Sync {
    fn grant_match(
        &self,
        snapshot: &dyn Snapshot,
        credential: &[u8],
        identity: &[u8],
    ) -> anyhow::Result<()>;
}

/// Replica-side DKG actor for one form. The contract only consumes the DKG
/// output; running the protocol and submitting pubshares happens out-of-band.
pub trait DkgActor<C: CurveGroup>: Send + Sync {
    /// Threshold group public key, available once the setup finished.
    fn public_key(&self) -> anyhow::Result<C>;

    /// Reconstruction threshold of the sharing.
    fn threshold(&self) -> usize;

    /// Ask the replica to compute and submit its pubshares transaction.
    fn compute_pubshares(&self) -> anyhow::Result<()>;
}

pub trait DkgRegistry<C: CurveGroup>: Send + Sync {
    fn listen(&self, form_id: &FormId) -> anyhow::Result<Arc<dyn DkgActor<C>>>;
}
