pub mod error;
pub mod metrics;
pub mod transactions;

mod execute;
mod store;


use std::sync::Arc;

use ark_ec::CurveGroup;
use sha2::{Digest, Sha256};

use crate::crypto::elgamal::PointEmbedding;
use crate::forms::FormId;
use crate::ordering::{AccessService, DkgRegistry, ExecuteStep, Snapshot};

pub use error::ContractError;
pub use metrics::{ContractMetrics, CountingMetrics, NoopMetrics};
pub use transactions::{Command, COMMAND_ARG, TRANSACTION_ARG};

const LOG_TARGET: &str = "mixtally::contract";

/// The form state machine. Every replica executes it against the shared
/// snapshot for each ordered transaction; execution is purely sequential and
/// deterministic, so all replicas converge on the same form records.
pub struct FormContract<C: CurveGroup> {
    access_key: Vec<u8>,
    roster_key: Vec<u8>,
    access: Arc<dyn AccessService>,
    dkg: Arc<dyn DkgRegistry<C>>,
    metrics: Arc<dyn ContractMetrics>,
}

impl<C> FormContract<C>
where
    C: CurveGroup + PointEmbedding,
{
    pub fn new(
        access_key: Vec<u8>,
        roster_key: Vec<u8>,
        access: Arc<dyn AccessService>,
        dkg: Arc<dyn DkgRegistry<C>>,
    ) -> Self {
        Self {
            access_key,
            roster_key,
            access,
            dkg,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ContractMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Contract entry point: access check, command dispatch, one state
    /// mutation. Any error leaves the snapshot writes uncommitted and becomes
    /// the transaction's rejection reason.
    pub fn execute(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        self.access
            .grant_match(&*snapshot, &self.access_key, &step.current.identity)
            .map_err(|err| {
                ContractError::NotAuthorized(format!(
                    "identity not authorized: {} ({err})",
                    hex::encode(&step.current.identity)
                ))
            })?;

        let command_bytes = step.current.arg(COMMAND_ARG).ok_or_else(|| {
            ContractError::MalformedArgument(
                "\"evoting:command\" not found in tx arg".to_string(),
            )
        })?;
        let command = Command::from_bytes(command_bytes).ok_or_else(|| {
            ContractError::MalformedArgument(format!(
                "unknown command: {}",
                String::from_utf8_lossy(command_bytes)
            ))
        })?;

        tracing::debug!(
            target: LOG_TARGET,
            command = command.as_str(),
            tx_id = %hex::encode(&step.current.id),
            "executing command"
        );

        match command {
            Command::CreateForm => self.create_form(snapshot, step),
            Command::OpenForm => self.open_form(snapshot, step),
            Command::CastVote => self.cast_vote(snapshot, step),
            Command::CloseForm => self.close_form(snapshot, step),
            Command::ShuffleBallots => self.shuffle_ballots(snapshot, step),
            Command::RegisterPubShares => self.register_pubshares(snapshot, step),
            Command::CombineShares => self.combine_shares(snapshot, step),
            Command::CancelForm => self.cancel_form(snapshot, step),
            Command::DeleteForm => self.delete_form(snapshot, step),
        }
    }
}

/// A form's id is the SHA-256 of the transaction that created it.
pub fn form_id_from_tx(tx_id: &[u8]) -> FormId {
    Sha256::digest(tx_id).into()
}
