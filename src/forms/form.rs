use std::fmt;

use ark_ec::CurveGroup;
use serde::{Deserialize, Serialize};

use super::ballot::Ballot;
use super::configuration::Configuration;
use crate::codec::{CanonicalReader, CanonicalWriter, CodecError};
use crate::crypto::elgamal::{Ciphervote, ElGamalCiphertext, PointEmbedding};
use crate::crypto::shuffle::ShuffleProof;

/// 32-byte form identifier: SHA-256 of the creating transaction's id.
pub type FormId = [u8; 32];

/// Lifecycle state of a form. The numeric values are part of the stored
/// record and must not be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormStatus {
    Initial,
    Open,
    Closed,
    ShuffledBallots,
    PubSharesSubmitted,
    ResultAvailable,
    Cancelled,
}

impl FormStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            FormStatus::Initial => 0,
            FormStatus::Open => 1,
            FormStatus::Closed => 2,
            FormStatus::ShuffledBallots => 3,
            FormStatus::PubSharesSubmitted => 4,
            FormStatus::ResultAvailable => 5,
            FormStatus::Cancelled => 6,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => FormStatus::Initial,
            1 => FormStatus::Open,
            2 => FormStatus::Closed,
            3 => FormStatus::ShuffledBallots,
            4 => FormStatus::PubSharesSubmitted,
            5 => FormStatus::ResultAvailable,
            6 => FormStatus::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FormStatus::ResultAvailable | FormStatus::Cancelled)
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// One node participating in a form: its network address and the BLS key it
/// signs shuffle and pubshares transactions with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub address: String,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub public_key: Vec<u8>,
}

/// Ordered authority of a form, copied from the ordering layer at creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub members: Vec<RosterMember>,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains_key(&self, public_key: &[u8]) -> bool {
        self.members
            .iter()
            .any(|member| member.public_key == public_key)
    }

    /// Shuffles required before the column counts as mixed:
    /// `max(2·⌊n/3⌋ + 1, 1)`, tolerating up to ⌊n/3⌋ Byzantine nodes.
    pub fn shuffle_threshold(&self) -> usize {
        (2 * (self.members.len() / 3) + 1).max(1)
    }

    pub fn write_canonical(&self, writer: &mut CanonicalWriter) {
        writer.append_u32(self.members.len() as u32);
        for member in &self.members {
            writer.append_str(&member.address);
            writer.append_bytes(&member.public_key);
        }
    }

    pub fn read_canonical(reader: &mut CanonicalReader) -> Result<Self, CodecError> {
        let count = reader.read_len()?;
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            members.push(RosterMember {
                address: reader.read_string()?,
                public_key: reader.read_bytes()?.to_vec(),
            });
        }
        Ok(Self { members })
    }

    /// Encodes the roster as stored by the ordering layer under `roster_key`.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = CanonicalWriter::bare();
        self.write_canonical(&mut writer);
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = CanonicalReader::new(bytes);
        let roster = Self::read_canonical(&mut reader)?;
        reader.finish()?;
        Ok(roster)
    }
}

/// Ordered mapping from user id to ciphervote with latest-cast-wins
/// semantics: re-casting replaces the previous vote in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: ark_serialize::CanonicalSerialize",
    deserialize = "C: ark_serialize::CanonicalDeserialize"
))]
pub struct Suffragia<C: CurveGroup> {
    user_ids: Vec<String>,
    ciphervotes: Vec<Ciphervote<C>>,
}

impl<C: CurveGroup> Suffragia<C> {
    pub fn cast_vote(&mut self, user_id: &str, ciphervote: Ciphervote<C>) {
        match self.user_ids.iter().position(|id| id == user_id) {
            Some(position) => self.ciphervotes[position] = ciphervote,
            None => {
                self.user_ids.push(user_id.to_string());
                self.ciphervotes.push(ciphervote);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn ciphervotes(&self) -> &[Ciphervote<C>] {
        &self.ciphervotes
    }
}

/// One accepted shuffle round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: ark_serialize::CanonicalSerialize, C::ScalarField: ark_serialize::CanonicalSerialize",
    deserialize = "C: ark_serialize::CanonicalDeserialize, C::ScalarField: ark_serialize::CanonicalDeserialize"
))]
pub struct ShuffleInstance<C: CurveGroup> {
    pub shuffled_ballots: Vec<Ciphervote<C>>,
    pub proof: ShuffleProof<C>,
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub random_vector: Vec<C::ScalarField>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub shuffler_public_key: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub signature: Vec<u8>,
}

/// One node's decryption shares, shaped `[ballots][chunks]`.
pub type PubsharesUnit<C> = Vec<Vec<C>>;

/// All pubshares submissions of a form, kept as parallel lists so the
/// submitting key and sharing index of every unit stay attached.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: ark_serialize::CanonicalSerialize",
    deserialize = "C: ark_serialize::CanonicalDeserialize"
))]
pub struct PubsharesUnits<C: CurveGroup> {
    #[serde(with = "crate::crypto_serde::element_matrix_seq")]
    pub units: Vec<PubsharesUnit<C>>,
    pub public_keys: Vec<Vec<u8>>,
    pub indexes: Vec<usize>,
}

impl<C: CurveGroup> PubsharesUnits<C> {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// The replicated form record. The contract reads it from the snapshot,
/// applies one command, and writes the modified copy back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Form<C: CurveGroup> {
    pub form_id: FormId,
    pub admin_id: String,
    pub status: FormStatus,
    pub roster: Roster,
    pub configuration: Configuration,
    pub pubkey: Option<C>,
    pub ballot_size: usize,
    pub suffragia: Suffragia<C>,
    pub shuffle_instances: Vec<ShuffleInstance<C>>,
    pub shuffle_threshold: usize,
    pub pubshares_units: PubsharesUnits<C>,
    pub decrypted_ballots: Vec<Ballot>,
}

impl<C: CurveGroup> Form<C> {
    /// Fresh form as written by CreateForm.
    pub fn new(form_id: FormId, admin_id: String, configuration: Configuration, roster: Roster) -> Self {
        let shuffle_threshold = roster.shuffle_threshold();
        Self {
            form_id,
            admin_id,
            status: FormStatus::Initial,
            roster,
            configuration,
            pubkey: None,
            ballot_size: 0,
            suffragia: Suffragia::default(),
            shuffle_instances: Vec::new(),
            shuffle_threshold,
            pubshares_units: PubsharesUnits::default(),
            decrypted_ballots: Vec::new(),
        }
    }

    /// The ciphertext column the next shuffle starts from: the last accepted
    /// shuffle, or the raw suffragia before round zero.
    pub fn current_column(&self) -> &[Ciphervote<C>] {
        self.shuffle_instances
            .last()
            .map(|instance| &instance.shuffled_ballots[..])
            .unwrap_or_else(|| self.suffragia.ciphervotes())
    }
}

impl<C: CurveGroup + PointEmbedding> Form<C> {
    /// Ciphertext chunks per ballot, derived from the ballot size and the
    /// suite's per-point embedding capacity.
    pub fn chunks_per_ballot(&self) -> usize {
        let capacity = C::embed_capacity();
        self.ballot_size.div_ceil(capacity)
    }
}

const FORM_RECORD_VERSION: u8 = 1;

fn write_ciphervote<C: CurveGroup>(writer: &mut CanonicalWriter, ciphervote: &Ciphervote<C>) {
    writer.append_u32(ciphervote.len() as u32);
    for chunk in ciphervote {
        writer.append_element(&chunk.k);
        writer.append_element(&chunk.c);
    }
}

fn read_ciphervote<C: CurveGroup>(reader: &mut CanonicalReader) -> Result<Ciphervote<C>, CodecError> {
    let chunks = reader.read_len()?;
    let mut ciphervote = Vec::with_capacity(chunks);
    for _ in 0..chunks {
        let k = reader.read_element()?;
        let c = reader.read_element()?;
        ciphervote.push(ElGamalCiphertext::new(k, c));
    }
    Ok(ciphervote)
}

fn write_column<C: CurveGroup>(writer: &mut CanonicalWriter, column: &[Ciphervote<C>]) {
    writer.append_u32(column.len() as u32);
    for ciphervote in column {
        write_ciphervote(writer, ciphervote);
    }
}

fn read_column<C: CurveGroup>(reader: &mut CanonicalReader) -> Result<Vec<Ciphervote<C>>, CodecError> {
    let count = reader.read_len()?;
    let mut column = Vec::with_capacity(count);
    for _ in 0..count {
        column.push(read_ciphervote(reader)?);
    }
    Ok(column)
}

fn write_points<C: CurveGroup>(writer: &mut CanonicalWriter, points: &[C]) {
    writer.append_u32(points.len() as u32);
    for point in points {
        writer.append_element(point);
    }
}

fn read_points<C: CurveGroup>(reader: &mut CanonicalReader) -> Result<Vec<C>, CodecError> {
    let count = reader.read_len()?;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push(reader.read_element()?);
    }
    Ok(points)
}

fn write_scalars<C: CurveGroup>(writer: &mut CanonicalWriter, scalars: &[C::ScalarField]) {
    writer.append_u32(scalars.len() as u32);
    for scalar in scalars {
        writer.append_element(scalar);
    }
}

fn read_scalars<C: CurveGroup>(
    reader: &mut CanonicalReader,
) -> Result<Vec<C::ScalarField>, CodecError> {
    let count = reader.read_len()?;
    let mut scalars = Vec::with_capacity(count);
    for _ in 0..count {
        scalars.push(reader.read_element()?);
    }
    Ok(scalars)
}

fn write_shuffle_proof<C: CurveGroup>(writer: &mut CanonicalWriter, proof: &ShuffleProof<C>) {
    write_points(writer, &proof.permutation_commitments);
    write_points(writer, &proof.chain_commitments);
    writer.append_element(&proof.t1);
    writer.append_element(&proof.t2);
    writer.append_element(&proof.t3);
    writer.append_element(&proof.t4_k);
    writer.append_element(&proof.t4_c);
    write_points(writer, &proof.t_hat);
    writer.append_element(&proof.s1);
    writer.append_element(&proof.s2);
    writer.append_element(&proof.s3);
    writer.append_element(&proof.s4);
    write_scalars::<C>(writer, &proof.s_hat);
    write_scalars::<C>(writer, &proof.s_tilde);
}

fn read_shuffle_proof<C: CurveGroup>(
    reader: &mut CanonicalReader,
) -> Result<ShuffleProof<C>, CodecError> {
    Ok(ShuffleProof {
        permutation_commitments: read_points(reader)?,
        chain_commitments: read_points(reader)?,
        t1: reader.read_element()?,
        t2: reader.read_element()?,
        t3: reader.read_element()?,
        t4_k: reader.read_element()?,
        t4_c: reader.read_element()?,
        t_hat: read_points(reader)?,
        s1: reader.read_element()?,
        s2: reader.read_element()?,
        s3: reader.read_element()?,
        s4: reader.read_element()?,
        s_hat: read_scalars::<C>(reader)?,
        s_tilde: read_scalars::<C>(reader)?,
    })
}

impl<C: CurveGroup> Form<C> {
    /// Canonical store encoding: byte-identical across replicas for the same
    /// logical value.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = CanonicalWriter::bare();
        writer.append_u8(FORM_RECORD_VERSION);
        writer.append_bytes(&self.form_id);
        writer.append_str(&self.admin_id);
        writer.append_u8(self.status.as_u8());
        self.roster.write_canonical(&mut writer);
        self.configuration.write_canonical(&mut writer);
        match &self.pubkey {
            Some(pubkey) => {
                writer.append_u8(1);
                writer.append_element(pubkey);
            }
            None => writer.append_u8(0),
        }
        writer.append_u64(self.ballot_size as u64);

        writer.append_u32(self.suffragia.len() as u32);
        for (user_id, ciphervote) in self
            .suffragia
            .user_ids()
            .iter()
            .zip(self.suffragia.ciphervotes())
        {
            writer.append_str(user_id);
            write_ciphervote(&mut writer, ciphervote);
        }

        writer.append_u32(self.shuffle_instances.len() as u32);
        for instance in &self.shuffle_instances {
            write_column(&mut writer, &instance.shuffled_ballots);
            write_shuffle_proof(&mut writer, &instance.proof);
            write_scalars::<C>(&mut writer, &instance.random_vector);
            writer.append_bytes(&instance.shuffler_public_key);
            writer.append_bytes(&instance.signature);
        }
        writer.append_u64(self.shuffle_threshold as u64);

        writer.append_u32(self.pubshares_units.units.len() as u32);
        for unit in &self.pubshares_units.units {
            writer.append_u32(unit.len() as u32);
            for row in unit {
                write_points(&mut writer, row);
            }
        }
        writer.append_u32(self.pubshares_units.public_keys.len() as u32);
        for key in &self.pubshares_units.public_keys {
            writer.append_bytes(key);
        }
        writer.append_u32(self.pubshares_units.indexes.len() as u32);
        for index in &self.pubshares_units.indexes {
            writer.append_u64(*index as u64);
        }

        writer.append_u32(self.decrypted_ballots.len() as u32);
        for ballot in &self.decrypted_ballots {
            ballot.write_canonical(&mut writer);
        }

        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = CanonicalReader::new(bytes);

        let version = reader.read_u8()?;
        if version != FORM_RECORD_VERSION {
            return Err(CodecError::InvalidDiscriminant {
                kind: "form record version",
                value: version as u64,
            });
        }

        let id_bytes = reader.read_bytes()?;
        let form_id: FormId =
            id_bytes
                .try_into()
                .map_err(|_| CodecError::InvalidDiscriminant {
                    kind: "form id length",
                    value: id_bytes.len() as u64,
                })?;
        let admin_id = reader.read_string()?;
        let status_value = reader.read_u8()?;
        let status =
            FormStatus::from_u8(status_value).ok_or(CodecError::InvalidDiscriminant {
                kind: "form status",
                value: status_value as u64,
            })?;
        let roster = Roster::read_canonical(&mut reader)?;
        let configuration = Configuration::read_canonical(&mut reader)?;
        let pubkey = match reader.read_u8()? {
            0 => None,
            1 => Some(reader.read_element()?),
            other => {
                return Err(CodecError::InvalidDiscriminant {
                    kind: "pubkey flag",
                    value: other as u64,
                })
            }
        };
        let ballot_size = reader.read_u64()? as usize;

        let mut suffragia = Suffragia::default();
        let voters = reader.read_len()?;
        for _ in 0..voters {
            let user_id = reader.read_string()?;
            let ciphervote = read_ciphervote(&mut reader)?;
            suffragia.cast_vote(&user_id, ciphervote);
        }

        let rounds = reader.read_len()?;
        let mut shuffle_instances = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            shuffle_instances.push(ShuffleInstance {
                shuffled_ballots: read_column(&mut reader)?,
                proof: read_shuffle_proof(&mut reader)?,
                random_vector: read_scalars::<C>(&mut reader)?,
                shuffler_public_key: reader.read_bytes()?.to_vec(),
                signature: reader.read_bytes()?.to_vec(),
            });
        }
        let shuffle_threshold = reader.read_u64()? as usize;

        let unit_count = reader.read_len()?;
        let mut units = Vec::with_capacity(unit_count);
        for _ in 0..unit_count {
            let ballots = reader.read_len()?;
            let mut unit = Vec::with_capacity(ballots);
            for _ in 0..ballots {
                unit.push(read_points(&mut reader)?);
            }
            units.push(unit);
        }
        let key_count = reader.read_len()?;
        let mut public_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            public_keys.push(reader.read_bytes()?.to_vec());
        }
        let index_count = reader.read_len()?;
        let mut indexes = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indexes.push(reader.read_u64()? as usize);
        }

        let ballot_count = reader.read_len()?;
        let mut decrypted_ballots = Vec::with_capacity(ballot_count);
        for _ in 0..ballot_count {
            decrypted_ballots.push(Ballot::read_canonical(&mut reader)?);
        }

        reader.finish()?;

        Ok(Self {
            form_id,
            admin_id,
            status,
            roster,
            configuration,
            pubkey,
            ballot_size,
            suffragia,
            shuffle_instances,
            shuffle_threshold,
            pubshares_units: PubsharesUnits {
                units,
                public_keys,
                indexes,
            },
            decrypted_ballots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::elgamal::ElGamalKeys;
    use ark_ed25519::{EdwardsProjective as Curve, Fr};
    use ark_std::{test_rng, UniformRand};

    fn sample_roster() -> Roster {
        Roster {
            members: vec![
                RosterMember {
                    address: "node-0:2001".into(),
                    public_key: vec![1; 96],
                },
                RosterMember {
                    address: "node-1:2001".into(),
                    public_key: vec![2; 96],
                },
                RosterMember {
                    address: "node-2:2001".into(),
                    public_key: vec![3; 96],
                },
            ],
        }
    }

    fn sample_vote(rng: &mut impl ark_std::rand::Rng) -> Ciphervote<Curve> {
        let keys = ElGamalKeys::<Curve>::new(Fr::rand(rng));
        vec![ElGamalCiphertext::encrypt(
            Curve::rand(rng),
            Fr::rand(rng),
            keys.public_key,
        )]
    }

    #[test]
    fn threshold_rule() {
        let mut roster = sample_roster();
        assert_eq!(roster.shuffle_threshold(), 3);

        roster.members.pop();
        roster.members.pop();
        assert_eq!(roster.shuffle_threshold(), 1);

        roster.members.pop();
        assert_eq!(roster.shuffle_threshold(), 1);
    }

    #[test]
    fn latest_cast_wins() {
        let mut rng = test_rng();
        let mut suffragia = Suffragia::<Curve>::default();

        let first = sample_vote(&mut rng);
        let second = sample_vote(&mut rng);
        suffragia.cast_vote("user1", first);
        suffragia.cast_vote("user2", sample_vote(&mut rng));
        suffragia.cast_vote("user1", second.clone());

        assert_eq!(suffragia.len(), 2);
        assert_eq!(suffragia.user_ids()[0], "user1");
        assert_eq!(suffragia.ciphervotes()[0], second);
    }

    #[test]
    fn status_codes_round_trip() {
        for value in 0..=6u8 {
            let status = FormStatus::from_u8(value).unwrap();
            assert_eq!(status.as_u8(), value);
        }
        assert!(FormStatus::from_u8(7).is_none());
        assert_eq!(FormStatus::Closed.to_string(), "2");
    }

    #[test]
    fn roster_record_round_trip() {
        let roster = sample_roster();
        let decoded = Roster::decode(&roster.encode()).unwrap();
        assert_eq!(roster, decoded);
    }

    #[test]
    fn form_record_round_trip() {
        let mut rng = test_rng();
        let mut form = Form::<Curve>::new(
            [9u8; 32],
            hex::encode("dummyAdminID"),
            Configuration {
                main_title: "title".into(),
                scaffold: Vec::new(),
            },
            sample_roster(),
        );
        form.status = FormStatus::Open;
        form.pubkey = Some(Curve::rand(&mut rng));
        form.ballot_size = 29;
        form.suffragia.cast_vote("user1", sample_vote(&mut rng));
        form.suffragia.cast_vote("user2", sample_vote(&mut rng));
        form.pubshares_units.public_keys.push(vec![7; 96]);
        form.pubshares_units.indexes.push(2);
        form.pubshares_units
            .units
            .push(vec![vec![Curve::rand(&mut rng)]]);

        let encoded = form.encode();
        let decoded = Form::<Curve>::decode(&encoded).unwrap();
        assert_eq!(form, decoded);

        // Store bytes are deterministic.
        assert_eq!(encoded, decoded.encode());
    }

    #[test]
    fn corrupted_record_is_rejected() {
        let form = Form::<Curve>::new(
            [9u8; 32],
            "admin".into(),
            Configuration::default(),
            sample_roster(),
        );
        let mut bytes = form.encode();
        bytes[0] = 99;
        assert!(Form::<Curve>::decode(&bytes).is_err());

        let mut truncated = form.encode();
        truncated.truncate(truncated.len() / 2);
        assert!(Form::<Curve>::decode(&truncated).is_err());
    }
}
