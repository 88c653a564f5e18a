use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ark_ec::CurveGroup;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::transactions::{
    shuffle_fingerprint, ShuffleBallotsTransaction, COMMAND_ARG, TRANSACTION_ARG,
};
use crate::contract::Command;
use crate::crypto::bls::BlsSigner;
use crate::crypto::elgamal::PointEmbedding;
use crate::crypto::shuffle::{prove_sequence_shuffle, shuffle_sequences};
use crate::crypto::stream::derive_scalars;
use crate::forms::{Form, FormId, FormStatus};
use crate::ordering::{OrderingService, Transaction, TransactionPool, TransactionResult};

const LOG_TARGET: &str = "mixtally::orchestrator";

/// How long one inclusion watch lasts before the orchestrator re-reads state
/// and retries.
const WATCH_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to get form: {0}")]
    FormUnavailable(String),
    #[error("the form must be closed: but status is {0}")]
    WrongStatus(FormStatus),
    #[error("failed to make tx: {0}")]
    MakeTransaction(String),
    #[error("failed to add transaction to the pool: {0}")]
    Pool(String),
    #[error("shuffle task cancelled")]
    Cancelled,
}

/// Per-node driver of the mix-net rounds for the forms this node serves.
///
/// On a start-shuffle signal the orchestrator produces verifiable shuffles
/// and submits them until the form reaches its shuffle threshold. Losing a
/// round race is expected: the contract rejects the stale round and the next
/// loop iteration starts from the advanced column.
pub struct ShuffleOrchestrator<C: CurveGroup + PointEmbedding> {
    ordering: Arc<dyn OrderingService>,
    pool: Arc<dyn TransactionPool>,
    signer: BlsSigner,
    identity: Vec<u8>,
    nonce: AtomicU64,
    _curve: std::marker::PhantomData<C>,
}

impl<C> ShuffleOrchestrator<C>
where
    C: CurveGroup + PointEmbedding,
{
    pub fn new(
        ordering: Arc<dyn OrderingService>,
        pool: Arc<dyn TransactionPool>,
        signer: BlsSigner,
        identity: Vec<u8>,
    ) -> Self {
        Self {
            ordering,
            pool,
            signer,
            identity,
            nonce: AtomicU64::new(0),
            _curve: std::marker::PhantomData,
        }
    }

    /// Handle one start-shuffle signal: loop until the threshold is reached
    /// or our own contribution is accepted. At most one transaction is in
    /// flight at any time.
    pub async fn handle_start_shuffle(
        &self,
        form_id: FormId,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            "starting the shuffle protocol"
        );

        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let form = self.read_form(&form_id)?;

            let round = form.shuffle_instances.len();
            if round >= form.shuffle_threshold {
                info!(
                    target: LOG_TARGET,
                    form_id = %hex::encode(form_id),
                    round,
                    "shuffle done"
                );
                return Ok(());
            }

            if form.status != FormStatus::Closed {
                return Err(OrchestratorError::WrongStatus(form.status));
            }

            let tx = self.make_shuffle_tx(&form)?;
            let tx_id = tx.id.clone();

            // Subscribe before submitting so the commit event cannot be
            // missed.
            let mut events = self.ordering.watch();

            self.pool
                .add(tx)
                .map_err(|err| OrchestratorError::Pool(err.to_string()))?;

            let (accepted, reason) = tokio::select! {
                outcome = watch_until(&mut events, &tx_id) => outcome,
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            };

            if accepted {
                info!(
                    target: LOG_TARGET,
                    form_id = %hex::encode(form_id),
                    round,
                    "our shuffling contribution has been accepted"
                );
                return Ok(());
            }

            debug!(
                target: LOG_TARGET,
                form_id = %hex::encode(form_id),
                round,
                reason = %reason,
                "shuffling contribution denied, retrying"
            );
        }
    }

    fn read_form(&self, form_id: &FormId) -> Result<Form<C>, OrchestratorError> {
        let bytes = self
            .ordering
            .get_proof(form_id)
            .map_err(|err| OrchestratorError::FormUnavailable(err.to_string()))?
            .ok_or_else(|| {
                OrchestratorError::FormUnavailable(format!(
                    "no form stored under {}",
                    hex::encode(form_id)
                ))
            })?;
        Form::decode(&bytes).map_err(|err| OrchestratorError::FormUnavailable(err.to_string()))
    }

    /// Shuffle the current column with fresh system randomness and wrap the
    /// result into a signed transaction. Only the challenge vector is
    /// fingerprint-derived; the permutation is not deterministic.
    fn make_shuffle_tx(&self, form: &Form<C>) -> Result<Transaction, OrchestratorError> {
        let mut rng = rand::thread_rng();

        let pubkey = form.pubkey.ok_or_else(|| {
            OrchestratorError::MakeTransaction("the form has no public key".to_string())
        })?;
        let round = form.shuffle_instances.len();
        let column = form.current_column();

        let (shuffled, witness) = shuffle_sequences(column, pubkey, &mut rng);

        let fingerprint = shuffle_fingerprint(&form.form_id, round, &shuffled);
        let chunks = form.chunks_per_ballot();
        let random_vector: Vec<C::ScalarField> = derive_scalars(&fingerprint, chunks);

        let proof = prove_sequence_shuffle(
            &witness,
            column,
            &shuffled,
            pubkey,
            &random_vector,
            &mut rng,
        )
        .map_err(|err| OrchestratorError::MakeTransaction(format!("shuffle proof failed: {err}")))?;

        let payload = ShuffleBallotsTransaction::<C> {
            form_id: hex::encode(form.form_id),
            round,
            shuffled_ballots: shuffled,
            proof,
            random_vector,
            public_key: self.signer.public_key(),
            signature: self.signer.sign(&fingerprint),
        };
        let serialized = serde_json::to_vec(&payload).map_err(|err| {
            OrchestratorError::MakeTransaction(format!(
                "failed to marshal the shuffle transaction: {err}"
            ))
        })?;

        let mut args = BTreeMap::new();
        args.insert(
            COMMAND_ARG.to_string(),
            Command::ShuffleBallots.as_str().as_bytes().to_vec(),
        );
        args.insert(TRANSACTION_ARG.to_string(), serialized);

        Ok(Transaction::new(
            self.identity.clone(),
            self.nonce.fetch_add(1, Ordering::Relaxed),
            args,
        ))
    }
}

/// Wait for the commit result of `tx_id`, bounded by the watch timeout.
/// Returns `(false, reason)` on rejection, timeout, or a closed channel.
async fn watch_until(
    events: &mut broadcast::Receiver<TransactionResult>,
    tx_id: &[u8],
) -> (bool, String) {
    let outcome = tokio::time::timeout(WATCH_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(result) if result.tx_id == tx_id => {
                    return (result.accepted, result.message);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(target: LOG_TARGET, missed, "watch stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return (false, "watch channel closed".to_string());
                }
            }
        }
    })
    .await;

    outcome.unwrap_or_else(|_| (false, "watch timeout".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::transactions::{
        pubshares_fingerprint, RegisterPubSharesTransaction,
    };
    use crate::crypto::elgamal::decryption_share;
    use crate::forms::Ballot;
    use crate::test_support::{
        ballot_plaintext, cast_vote_tx, close_form_tx, combine_shares_tx, marshall_ballot, TestBed,
    };
    use ark_ed25519::EdwardsProjective as Curve;

    fn orchestrators(bed: &TestBed) -> Vec<ShuffleOrchestrator<Curve>> {
        bed.signers
            .iter()
            .enumerate()
            .map(|(node, signer)| {
                ShuffleOrchestrator::new(
                    bed.ordering.clone(),
                    bed.ordering.clone(),
                    signer.clone(),
                    format!("node-{node}").into_bytes(),
                )
            })
            .collect()
    }

    async fn run_all_shufflers(bed: &TestBed, form_id: FormId) {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for orchestrator in orchestrators(bed) {
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.handle_start_shuffle(form_id, &cancel).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn shufflers_converge_to_the_threshold() {
        let bed = TestBed::new(3);
        let form_id = bed.create_and_open_form();

        bed.submit_ok(cast_vote_tx(
            &bed,
            form_id,
            "user1",
            marshall_ballot(&bed, form_id, &ballot_plaintext("yes")),
        ));
        bed.submit_ok(cast_vote_tx(
            &bed,
            form_id,
            "user2",
            marshall_ballot(&bed, form_id, &ballot_plaintext("ja")),
        ));
        bed.submit_ok(close_form_tx(&bed, form_id));

        run_all_shufflers(&bed, form_id).await;

        let form = bed.form(form_id);
        assert_eq!(form.shuffle_instances.len(), form.shuffle_threshold);
        assert_eq!(form.status, FormStatus::ShuffledBallots);

        // Every shuffler contributed exactly once.
        let mut keys: Vec<_> = form
            .shuffle_instances
            .iter()
            .map(|instance| instance.shuffler_public_key.clone())
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), form.shuffle_threshold);
    }

    #[tokio::test]
    async fn orchestrator_fails_on_an_open_form() {
        let bed = TestBed::new(3);
        let form_id = bed.create_and_open_form();

        let orchestrator = orchestrators(&bed).remove(0);
        let cancel = CancellationToken::new();
        let err = orchestrator
            .handle_start_shuffle(form_id, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::WrongStatus(FormStatus::Open)
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let bed = TestBed::new(3);
        let form_id = bed.create_and_open_form();

        let orchestrator = orchestrators(&bed).remove(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator
            .handle_start_shuffle(form_id, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
    }

    /// Happy path over the in-memory ordering backend: three nodes, two
    /// voters, full pipeline down to decrypted ballots.
    #[tokio::test]
    async fn end_to_end_election() {
        let bed = TestBed::new(3);
        let form_id = bed.create_and_open_form();

        bed.submit_ok(cast_vote_tx(
            &bed,
            form_id,
            "user1",
            marshall_ballot(&bed, form_id, &ballot_plaintext("yes")),
        ));
        bed.submit_ok(cast_vote_tx(
            &bed,
            form_id,
            "user2",
            marshall_ballot(&bed, form_id, &ballot_plaintext("ja")),
        ));
        bed.submit_ok(close_form_tx(&bed, form_id));

        run_all_shufflers(&bed, form_id).await;

        // Pubshares over the final shuffled column, one unit per node.
        let form = bed.form(form_id);
        let column = form.current_column().to_vec();
        for (node, signer) in bed.signers.iter().enumerate() {
            let pubshares: Vec<Vec<Curve>> = column
                .iter()
                .map(|vote| {
                    vote.iter()
                        .map(|chunk| decryption_share(bed.dkg_shares[node], chunk))
                        .collect()
                })
                .collect();
            let fingerprint = pubshares_fingerprint(&form_id, node, &pubshares);
            let payload = RegisterPubSharesTransaction::<Curve> {
                form_id: hex::encode(form_id),
                index: node,
                pubshares,
                public_key: signer.public_key(),
                signature: signer.sign(&fingerprint),
            };
            bed.submit_ok(bed.tx(
                Command::RegisterPubShares,
                serde_json::to_vec(&payload).unwrap(),
            ));
        }

        let form = bed.form(form_id);
        assert_eq!(form.status, FormStatus::PubSharesSubmitted);

        bed.submit_ok(combine_shares_tx(&bed, form_id));

        let form = bed.form(form_id);
        assert_eq!(form.status, FormStatus::ResultAvailable);
        assert_eq!(form.decrypted_ballots.len(), 2);

        // The shuffle may reorder the two ballots.
        let mut answers: Vec<String> = form
            .decrypted_ballots
            .iter()
            .map(|ballot: &Ballot| ballot.text_result[0][0].clone())
            .collect();
        answers.sort();
        assert_eq!(answers, vec!["ja".to_string(), "yes".to_string()]);
    }
}
