use ark_ec::CurveGroup;
use serde::de::DeserializeOwned;

use super::transactions::{
    parse_form_id, pubshares_fingerprint, shuffle_fingerprint, CancelFormTransaction,
    CastVoteTransaction, CloseFormTransaction, CombineSharesTransaction, CreateFormTransaction,
    DeleteFormTransaction, OpenFormTransaction, RegisterPubSharesTransaction,
    ShuffleBallotsTransaction, TRANSACTION_ARG,
};
use super::store::{delete_form, read_form, read_roster, write_form};
use super::{form_id_from_tx, ContractError, FormContract, LOG_TARGET};
use crate::crypto::elgamal::PointEmbedding;
use crate::crypto::lagrange::recover_secret_point;
use crate::crypto::shuffle::verify_sequence_shuffle;
use crate::crypto::stream::derive_scalars;
use crate::crypto::{bls, CryptoError};
use crate::forms::{Ballot, Form, FormId, FormStatus, ShuffleInstance};
use crate::ordering::{ExecuteStep, Snapshot};

fn get_transaction<T: DeserializeOwned>(step: &ExecuteStep) -> Result<T, ContractError> {
    let data = step.current.arg(TRANSACTION_ARG).ok_or_else(|| {
        ContractError::MalformedArgument(
            "failed to get transaction: \"evoting:arg\" not found in tx arg".to_string(),
        )
    })?;
    serde_json::from_slice(data).map_err(|err| {
        ContractError::MalformedArgument(format!(
            "failed to get transaction: failed to deserialize transaction: {err}"
        ))
    })
}

fn parse_id(encoded: &str) -> Result<FormId, ContractError> {
    parse_form_id(encoded)
        .map_err(|err| ContractError::MalformedArgument(format!("failed to get form: {err}")))
}

impl<C> FormContract<C>
where
    C: CurveGroup + PointEmbedding,
{
    pub(super) fn create_form(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: CreateFormTransaction = get_transaction(step)?;

        let form_id = form_id_from_tx(&step.current.id);

        let roster = read_roster(snapshot, &self.roster_key)?;

        let form = Form::<C>::new(form_id, tx.admin_id, tx.configuration, roster);
        write_form(snapshot, &form)?;

        tracing::info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            shuffle_threshold = form.shuffle_threshold,
            "form created"
        );
        self.metrics.form_status(&form_id, form.status);
        Ok(())
    }

    pub(super) fn open_form(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: OpenFormTransaction = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if form.status != FormStatus::Initial {
            return Err(ContractError::WrongStatus(format!(
                "the form is not initial, current status: {}",
                form.status
            )));
        }

        let actor = self.dkg.listen(&form_id).map_err(|err| {
            ContractError::PreconditionUnmet(format!("failed to get dkg actor: {err}"))
        })?;
        let pubkey = actor.public_key().map_err(|err| {
            ContractError::PreconditionUnmet(format!("failed to get dkg public key: {err}"))
        })?;

        // The pubshares threshold and the DKG reconstruction threshold must
        // be equal by construction; a mismatch would make CombineShares
        // interpolate garbage.
        if actor.threshold() != form.shuffle_threshold {
            return Err(ContractError::PreconditionUnmet(format!(
                "dkg threshold {} does not match the shuffle threshold {}",
                actor.threshold(),
                form.shuffle_threshold
            )));
        }

        let ballot_size = form.configuration.max_ballot_size();
        if ballot_size == 0 {
            return Err(ContractError::PreconditionUnmet(
                "the form configuration has no questions".to_string(),
            ));
        }

        form.pubkey = Some(pubkey);
        form.ballot_size = ballot_size;
        form.status = FormStatus::Open;
        write_form(snapshot, &form)?;

        tracing::info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            ballot_size,
            chunks_per_ballot = form.chunks_per_ballot(),
            "form opened"
        );
        self.metrics.form_status(&form_id, form.status);
        Ok(())
    }

    pub(super) fn cast_vote(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: CastVoteTransaction<C> = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if form.status != FormStatus::Open {
            return Err(ContractError::WrongStatus(format!(
                "the form is not open, current status: {}",
                form.status
            )));
        }

        // Any well-formed ciphertext is accepted; plaintext validity is only
        // checked after decryption.
        let chunks = form.chunks_per_ballot();
        if tx.ballot.len() != chunks {
            return Err(ContractError::MalformedArgument(format!(
                "the ballot has unexpected length: {} != {}",
                tx.ballot.len(),
                chunks
            )));
        }

        form.suffragia.cast_vote(&tx.user_id, tx.ballot);
        write_form(snapshot, &form)?;

        self.metrics.ballots_cast(&form_id, form.suffragia.len());
        Ok(())
    }

    pub(super) fn close_form(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: CloseFormTransaction = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if tx.user_id != form.admin_id {
            return Err(ContractError::NotAuthorized(
                "only the admin can close the form".to_string(),
            ));
        }
        if form.status != FormStatus::Open {
            return Err(ContractError::WrongStatus(format!(
                "the form is not open, current status: {}",
                form.status
            )));
        }
        if form.suffragia.len() < 2 {
            return Err(ContractError::PreconditionUnmet(
                "at least two ballots are required".to_string(),
            ));
        }

        form.status = FormStatus::Closed;
        write_form(snapshot, &form)?;

        tracing::info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            ballots = form.suffragia.len(),
            "form closed"
        );
        self.metrics.form_status(&form_id, form.status);
        Ok(())
    }

    pub(super) fn shuffle_ballots(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: ShuffleBallotsTransaction<C> = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if form.status != FormStatus::Closed {
            return Err(ContractError::WrongStatus(
                "the form is not closed".to_string(),
            ));
        }

        // Only the first transaction per round wins; replays and lost races
        // land here and are rejected.
        let expected_round = form.shuffle_instances.len();
        if tx.round != expected_round {
            return Err(ContractError::PreconditionUnmet(format!(
                "wrong shuffle round: expected round '{expected_round}', \
                 transaction is for round '{}'",
                tx.round
            )));
        }

        if !form.roster.contains_key(&tx.public_key) {
            return Err(ContractError::NotAuthorized(format!(
                "could not verify identity of shuffler: public key not associated \
                 to a member of the roster: {}",
                hex::encode(&tx.public_key)
            )));
        }

        // One shuffle per node per form.
        for (round, instance) in form.shuffle_instances.iter().enumerate() {
            if instance.shuffler_public_key == tx.public_key {
                return Err(ContractError::DuplicateSubmission(format!(
                    "a node already submitted a shuffle that has been accepted in round {round}"
                )));
            }
        }

        let fingerprint = shuffle_fingerprint(&form_id, tx.round, &tx.shuffled_ballots);

        bls::verify(&tx.public_key, &fingerprint, &tx.signature).map_err(|err| {
            ContractError::CryptoVerifyFailed(format!(
                "signature does not match the shuffle: {err}"
            ))
        })?;

        let chunks = form.chunks_per_ballot();
        if tx.random_vector.len() != chunks {
            return Err(ContractError::MalformedArgument(format!(
                "random vector has unexpected length: {} != {}",
                tx.random_vector.len(),
                chunks
            )));
        }
        let expected_vector: Vec<C::ScalarField> = derive_scalars(&fingerprint, chunks);
        if tx.random_vector != expected_vector {
            return Err(ContractError::CryptoVerifyFailed(
                "random vector from shuffle transaction is different than expected \
                 random vector"
                    .to_string(),
            ));
        }

        let previous = form.current_column();
        if previous.len() < 2 {
            return Err(ContractError::PreconditionUnmet(format!(
                "not enough votes: {} < 2",
                previous.len()
            )));
        }
        if tx.shuffled_ballots.len() != previous.len() {
            return Err(ContractError::MalformedArgument(format!(
                "the shuffled column has unexpected length: {} != {}",
                tx.shuffled_ballots.len(),
                previous.len()
            )));
        }

        let pubkey = form.pubkey.ok_or_else(|| {
            ContractError::PreconditionUnmet("the form has no public key".to_string())
        })?;

        verify_sequence_shuffle(
            previous,
            &tx.shuffled_ballots,
            pubkey,
            &expected_vector,
            &tx.proof,
        )
        .map_err(|err: CryptoError| {
            ContractError::CryptoVerifyFailed(format!("invalid shuffle proof: {err}"))
        })?;

        form.shuffle_instances.push(ShuffleInstance {
            shuffled_ballots: tx.shuffled_ballots,
            proof: tx.proof,
            random_vector: tx.random_vector,
            shuffler_public_key: tx.public_key,
            signature: tx.signature,
        });

        tracing::info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            round = tx.round,
            threshold = form.shuffle_threshold,
            "shuffle accepted"
        );
        self.metrics
            .shuffle_instances(&form_id, form.shuffle_instances.len());

        if form.shuffle_instances.len() == form.shuffle_threshold {
            form.status = FormStatus::ShuffledBallots;
            self.metrics.form_status(&form_id, form.status);
        }

        write_form(snapshot, &form)
    }

    pub(super) fn register_pubshares(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: RegisterPubSharesTransaction<C> = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if form.status != FormStatus::ShuffledBallots {
            return Err(ContractError::WrongStatus(
                "the ballots have not been shuffled".to_string(),
            ));
        }

        if !form.roster.contains_key(&tx.public_key) {
            return Err(ContractError::NotAuthorized(format!(
                "could not verify identity of node: public key not associated \
                 to a member of the roster: {}",
                hex::encode(&tx.public_key)
            )));
        }

        let fingerprint = pubshares_fingerprint(&form_id, tx.index, &tx.pubshares);
        bls::verify(&tx.public_key, &fingerprint, &tx.signature).map_err(|err| {
            ContractError::CryptoVerifyFailed(format!(
                "signature does not match the pubshares unit: {err}"
            ))
        })?;

        let ballots = form.current_column().len();
        let chunks = form.chunks_per_ballot();
        if tx.pubshares.len() != ballots {
            return Err(ContractError::MalformedArgument(format!(
                "unexpected size of pubshares submission: {} != {ballots}",
                tx.pubshares.len()
            )));
        }
        for row in &tx.pubshares {
            if row.len() != chunks {
                return Err(ContractError::MalformedArgument(format!(
                    "unexpected size of pubshares submission: {} != {chunks}",
                    row.len()
                )));
            }
        }

        if tx.index >= form.roster.len() {
            return Err(ContractError::MalformedArgument(format!(
                "pubshares index {} is out of range: the roster has {} members",
                tx.index,
                form.roster.len()
            )));
        }
        if form
            .pubshares_units
            .public_keys
            .iter()
            .any(|key| *key == tx.public_key)
        {
            return Err(ContractError::DuplicateSubmission(format!(
                "'{}' already made a submission",
                hex::encode(&tx.public_key)
            )));
        }
        if form.pubshares_units.indexes.contains(&tx.index) {
            return Err(ContractError::DuplicateSubmission(format!(
                "a submission has already been made for index {}",
                tx.index
            )));
        }

        form.pubshares_units.units.push(tx.pubshares);
        form.pubshares_units.public_keys.push(tx.public_key);
        form.pubshares_units.indexes.push(tx.index);

        tracing::info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            index = tx.index,
            submissions = form.pubshares_units.len(),
            "pubshares registered"
        );
        self.metrics
            .pubshares_registered(&form_id, form.pubshares_units.len());

        if form.pubshares_units.indexes.len() == form.shuffle_threshold {
            form.status = FormStatus::PubSharesSubmitted;
            self.metrics.form_status(&form_id, form.status);
        }

        write_form(snapshot, &form)
    }

    pub(super) fn combine_shares(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: CombineSharesTransaction = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if tx.user_id != form.admin_id {
            return Err(ContractError::NotAuthorized(
                "only the admin can decrypt the ballots".to_string(),
            ));
        }
        if form.status != FormStatus::PubSharesSubmitted {
            return Err(ContractError::WrongStatus(format!(
                "the public shares have not been submitted, current status: {}",
                form.status
            )));
        }

        let threshold = form.shuffle_threshold;
        if form.pubshares_units.len() < threshold {
            return Err(ContractError::PreconditionUnmet(format!(
                "not enough pubshares submitted: {} < {threshold}",
                form.pubshares_units.len()
            )));
        }

        let column = form.current_column();
        let chunks = form.chunks_per_ballot();
        let units = &form.pubshares_units;

        let mut decrypted = Vec::with_capacity(column.len());
        for (ballot_index, ciphervote) in column.iter().enumerate() {
            let mut plaintext = Vec::with_capacity(form.ballot_size);
            let mut valid = true;

            'chunks: for chunk_index in 0..chunks {
                // Any `threshold` distinct units recombine the chunk secret.
                let shares: Vec<(usize, C)> = units.indexes[..threshold]
                    .iter()
                    .zip(units.units[..threshold].iter())
                    .map(|(&index, unit)| (index, unit[ballot_index][chunk_index]))
                    .collect();

                let secret = match recover_secret_point(&shares) {
                    Ok(secret) => secret,
                    Err(_) => {
                        valid = false;
                        break 'chunks;
                    }
                };
                let message = ciphervote[chunk_index].c - secret;
                match message.extract() {
                    Ok(bytes) => plaintext.extend_from_slice(&bytes),
                    Err(_) => {
                        // A garbage ciphertext voids this single ballot, not
                        // the tally.
                        valid = false;
                        break 'chunks;
                    }
                }
            }

            let ballot = if valid {
                Ballot::unmarshal(&plaintext, &form.configuration).unwrap_or_default()
            } else {
                Ballot::default()
            };
            if ballot.is_empty() {
                tracing::warn!(
                    target: LOG_TARGET,
                    form_id = %hex::encode(form_id),
                    ballot_index,
                    "ballot recorded as empty"
                );
            }
            decrypted.push(ballot);
        }

        form.decrypted_ballots = decrypted;
        form.status = FormStatus::ResultAvailable;
        write_form(snapshot, &form)?;

        tracing::info!(
            target: LOG_TARGET,
            form_id = %hex::encode(form_id),
            ballots = form.decrypted_ballots.len(),
            "result available"
        );
        self.metrics.form_status(&form_id, form.status);
        Ok(())
    }

    pub(super) fn cancel_form(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: CancelFormTransaction = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;
        let mut form = read_form::<C>(snapshot, &form_id)?;

        if tx.user_id != form.admin_id {
            return Err(ContractError::NotAuthorized(
                "only the admin can cancel the form".to_string(),
            ));
        }
        if form.status.is_terminal() {
            return Err(ContractError::WrongStatus(format!(
                "the form is already finalized, current status: {}",
                form.status
            )));
        }

        form.status = FormStatus::Cancelled;
        write_form(snapshot, &form)?;

        self.metrics.form_status(&form_id, form.status);
        Ok(())
    }

    pub(super) fn delete_form(
        &self,
        snapshot: &mut dyn Snapshot,
        step: &ExecuteStep,
    ) -> Result<(), ContractError> {
        let tx: DeleteFormTransaction = get_transaction(step)?;
        let form_id = parse_id(&tx.form_id)?;

        // The form must exist; deleting an unknown id is a client error.
        read_form::<C>(snapshot, &form_id)?;

        delete_form(snapshot, &form_id)
    }
}
