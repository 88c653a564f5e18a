//! Store adapter: the only place where form records and the roster touch the
//! snapshot. Keys are raw 32-byte form ids; values are the canonical codec
//! encoding of the record.

use ark_ec::CurveGroup;

use super::ContractError;
use crate::forms::{Form, FormId, Roster};
use crate::ordering::Snapshot;

pub(super) fn read_form<C: CurveGroup>(
    snapshot: &dyn Snapshot,
    form_id: &FormId,
) -> Result<Form<C>, ContractError> {
    let bytes = snapshot
        .get(form_id)
        .map_err(|err| {
            ContractError::StorageFailure(format!(
                "failed to get key {}: {err}",
                hex::encode(form_id)
            ))
        })?
        .ok_or_else(|| {
            ContractError::NotFound(format!("form {} not found", hex::encode(form_id)))
        })?;
    Form::decode(&bytes)
        .map_err(|err| ContractError::StorageFailure(format!("failed to deserialize form: {err}")))
}

pub(super) fn write_form<C: CurveGroup>(
    snapshot: &mut dyn Snapshot,
    form: &Form<C>,
) -> Result<(), ContractError> {
    snapshot.set(&form.form_id, form.encode()).map_err(|err| {
        ContractError::StorageFailure(format!(
            "failed to set key {}: {err}",
            hex::encode(form.form_id)
        ))
    })
}

pub(super) fn delete_form(
    snapshot: &mut dyn Snapshot,
    form_id: &FormId,
) -> Result<(), ContractError> {
    snapshot.delete(form_id).map_err(|err| {
        ContractError::StorageFailure(format!(
            "failed to delete key {}: {err}",
            hex::encode(form_id)
        ))
    })
}

/// Roster record maintained by the ordering layer under the contract's
/// roster key.
pub(super) fn read_roster(
    snapshot: &dyn Snapshot,
    roster_key: &[u8],
) -> Result<Roster, ContractError> {
    let bytes = snapshot
        .get(roster_key)
        .map_err(|err| ContractError::StorageFailure(format!("failed to get roster: {err}")))?
        .ok_or_else(|| ContractError::StorageFailure("failed to get roster".to_string()))?;
    Roster::decode(&bytes).map_err(|err| {
        ContractError::StorageFailure(format!("failed to deserialize roster: {err}"))
    })
}
