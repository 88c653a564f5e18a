use ark_ec::CurveGroup;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};

use crate::codec::{CanonicalWriter, Fingerprint};
use crate::crypto::elgamal::Ciphervote;
use crate::crypto::shuffle::ShuffleProof;
use crate::forms::{Configuration, FormId, PubsharesUnit};

/// Transaction argument carrying the command name.
pub const COMMAND_ARG: &str = "evoting:command";
/// Transaction argument carrying the serialized typed transaction.
pub const TRANSACTION_ARG: &str = "evoting:arg";

/// The nine contract commands. The entry point matches on this tag and
/// dispatches to one handler per variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    CreateForm,
    OpenForm,
    CastVote,
    CloseForm,
    ShuffleBallots,
    RegisterPubShares,
    CombineShares,
    CancelForm,
    DeleteForm,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::CreateForm => "CreateForm",
            Command::OpenForm => "OpenForm",
            Command::CastVote => "CastVote",
            Command::CloseForm => "CloseForm",
            Command::ShuffleBallots => "ShuffleBallots",
            Command::RegisterPubShares => "RegisterPubShares",
            Command::CombineShares => "CombineShares",
            Command::CancelForm => "CancelForm",
            Command::DeleteForm => "DeleteForm",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(match bytes {
            b"CreateForm" => Command::CreateForm,
            b"OpenForm" => Command::OpenForm,
            b"CastVote" => Command::CastVote,
            b"CloseForm" => Command::CloseForm,
            b"ShuffleBallots" => Command::ShuffleBallots,
            b"RegisterPubShares" => Command::RegisterPubShares,
            b"CombineShares" => Command::CombineShares,
            b"CancelForm" => Command::CancelForm,
            b"DeleteForm" => Command::DeleteForm,
            _ => return None,
        })
    }
}

/// Decode the hex form id carried by a transaction payload.
pub fn parse_form_id(encoded: &str) -> Result<FormId, String> {
    let bytes = hex::decode(encoded)
        .map_err(|err| format!("failed to decode form id: {err}"))?;
    bytes
        .try_into()
        .map_err(|_| "failed to decode form id: expected 32 bytes".to_string())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateFormTransaction {
    pub configuration: Configuration,
    pub admin_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenFormTransaction {
    pub form_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: CanonicalSerialize",
    deserialize = "C: CanonicalDeserialize"
))]
pub struct CastVoteTransaction<C: CurveGroup> {
    pub form_id: String,
    pub user_id: String,
    pub ballot: Ciphervote<C>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloseFormTransaction {
    pub form_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: CanonicalSerialize, C::ScalarField: CanonicalSerialize",
    deserialize = "C: CanonicalDeserialize, C::ScalarField: CanonicalDeserialize"
))]
pub struct ShuffleBallotsTransaction<C: CurveGroup> {
    pub form_id: String,
    pub round: usize,
    pub shuffled_ballots: Vec<Ciphervote<C>>,
    pub proof: ShuffleProof<C>,
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub random_vector: Vec<C::ScalarField>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub signature: Vec<u8>,
}

/// The signed portion of a shuffle transaction. The proof, random vector and
/// signature are derived from this digest, so they stay outside of it.
pub fn shuffle_fingerprint<C: CurveGroup>(
    form_id: &FormId,
    round: usize,
    shuffled_ballots: &[Ciphervote<C>],
) -> [u8; 32] {
    struct Transcript<'a, C: CurveGroup> {
        form_id: &'a FormId,
        round: usize,
        shuffled_ballots: &'a [Ciphervote<C>],
    }

    impl<C: CurveGroup> Fingerprint for Transcript<'_, C> {
        fn domain_kind(&self) -> &'static str {
            "evoting/shuffle_ballots_v1"
        }

        fn write_transcript(&self, writer: &mut CanonicalWriter) {
            writer.append_bytes(self.form_id);
            writer.append_u64(self.round as u64);
            writer.append_u32(self.shuffled_ballots.len() as u32);
            for ciphervote in self.shuffled_ballots {
                writer.append_u32(ciphervote.len() as u32);
                for chunk in ciphervote {
                    writer.append_element(&chunk.k);
                    writer.append_element(&chunk.c);
                }
            }
        }
    }

    Transcript {
        form_id,
        round,
        shuffled_ballots,
    }
    .fingerprint()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: CanonicalSerialize",
    deserialize = "C: CanonicalDeserialize"
))]
pub struct RegisterPubSharesTransaction<C: CurveGroup> {
    pub form_id: String,
    pub index: usize,
    #[serde(with = "crate::crypto_serde::element_matrix")]
    pub pubshares: PubsharesUnit<C>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub signature: Vec<u8>,
}

/// The signed portion of a pubshares transaction.
pub fn pubshares_fingerprint<C: CurveGroup>(
    form_id: &FormId,
    index: usize,
    pubshares: &PubsharesUnit<C>,
) -> [u8; 32] {
    struct Transcript<'a, C: CurveGroup> {
        form_id: &'a FormId,
        index: usize,
        pubshares: &'a PubsharesUnit<C>,
    }

    impl<C: CurveGroup> Fingerprint for Transcript<'_, C> {
        fn domain_kind(&self) -> &'static str {
            "evoting/register_pubshares_v1"
        }

        fn write_transcript(&self, writer: &mut CanonicalWriter) {
            writer.append_bytes(self.form_id);
            writer.append_u64(self.index as u64);
            writer.append_u32(self.pubshares.len() as u32);
            for row in self.pubshares {
                writer.append_u32(row.len() as u32);
                for share in row {
                    writer.append_element(share);
                }
            }
        }
    }

    Transcript {
        form_id,
        index,
        pubshares,
    }
    .fingerprint()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CombineSharesTransaction {
    pub form_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelFormTransaction {
    pub form_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteFormTransaction {
    pub form_id: String,
}
