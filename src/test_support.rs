//! Shared fixtures: a simulated DKG output, a permissive access service, an
//! in-memory test bed wiring the contract into the memory ordering backend,
//! and transaction builders for the scripted scenarios.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ark_ec::PrimeGroup;
use ark_ed25519::{EdwardsProjective as Curve, Fr};
use ark_std::UniformRand;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::contract::transactions::{
    CastVoteTransaction, CloseFormTransaction, CombineSharesTransaction, CreateFormTransaction,
    OpenFormTransaction, COMMAND_ARG, TRANSACTION_ARG,
};
use crate::contract::{form_id_from_tx, Command, FormContract};
use crate::crypto::bls::BlsSigner;
use crate::crypto::elgamal::{encrypt_chunked, Ciphervote};
use crate::forms::{
    Configuration, Form, FormId, Roster, RosterMember, Select, Subject, Text,
};
use crate::ordering::memory::MemoryOrdering;
use crate::ordering::{
    AccessService, DkgActor, DkgRegistry, OrderingError, OrderingService, Snapshot, Transaction,
};

pub const ADMIN: &str = "dummyAdminID";

pub fn encode_id(id: &str) -> String {
    BASE64.encode(id)
}

/// The reference questionnaire: one select (four choices) and one free-text
/// question ("write yes in your language", at most three bytes).
pub fn basic_configuration() -> Configuration {
    Configuration {
        main_title: "dummyTitle".into(),
        scaffold: vec![Subject {
            id: encode_id("aa"),
            title: "subject1".into(),
            order: vec![encode_id("bb"), encode_id("ee")],
            subjects: Vec::new(),
            selects: vec![Select {
                id: encode_id("bb"),
                title: "Select your favorite snacks".into(),
                max_n: 3,
                min_n: 0,
                choices: vec![
                    "snickers".into(),
                    "mars".into(),
                    "vodka".into(),
                    "babibel".into(),
                ],
            }],
            ranks: Vec::new(),
            texts: vec![Text {
                id: encode_id("ee"),
                title: "dissertation".into(),
                max_n: 1,
                min_n: 0,
                max_length: 3,
                regex: String::new(),
                choices: vec!["write yes in your language".into()],
            }],
        }],
    }
}

/// Plaintext ballot answering the basic configuration with a fixed select
/// vector and the given text answer.
pub fn ballot_plaintext(answer: &str) -> Vec<u8> {
    format!(
        "select:{}:0,0,1,0\ntext:{}:{}\n\n",
        encode_id("bb"),
        encode_id("ee"),
        BASE64.encode(answer),
    )
    .into_bytes()
}

/// Access service that lets everything through.
pub struct PermissiveAccess;

impl AccessService for PermissiveAccess {
    fn grant_match(
        &self,
        _snapshot: &dyn Snapshot,
        _credential: &[u8],
        _identity: &[u8],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Access service that rejects everything, for the not-authorized paths.
pub struct DenyingAccess;

impl AccessService for DenyingAccess {
    fn grant_match(
        &self,
        _snapshot: &dyn Snapshot,
        _credential: &[u8],
        _identity: &[u8],
    ) -> anyhow::Result<()> {
        anyhow::bail!("fake error")
    }
}

/// Simulated DKG output: a Shamir sharing of a fresh secret. The group key
/// and one share per node are what the real protocol would leave behind.
pub struct SimulatedDkg {
    pub public_key: Curve,
    pub shares: Vec<Fr>,
    pub threshold: usize,
}

impl SimulatedDkg {
    pub fn new(nodes: usize, threshold: usize, rng: &mut impl ark_std::rand::Rng) -> Self {
        let coefficients: Vec<Fr> = (0..threshold).map(|_| Fr::rand(rng)).collect();
        let eval = |x: Fr| {
            let mut acc = Fr::from(0u64);
            for c in coefficients.iter().rev() {
                acc = acc * x + c;
            }
            acc
        };
        let shares = (0..nodes).map(|i| eval(Fr::from(i as u64 + 1))).collect();
        Self {
            public_key: Curve::generator() * coefficients[0],
            shares,
            threshold,
        }
    }
}

/// DKG registry handing out the same simulated actor for every form.
pub struct StaticDkgRegistry {
    pub public_key: Curve,
    pub threshold: usize,
}

struct StaticDkgActor {
    public_key: Curve,
    threshold: usize,
}

impl DkgActor<Curve> for StaticDkgActor {
    fn public_key(&self) -> anyhow::Result<Curve> {
        Ok(self.public_key)
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    fn compute_pubshares(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl DkgRegistry<Curve> for StaticDkgRegistry {
    fn listen(&self, _form_id: &FormId) -> anyhow::Result<Arc<dyn DkgActor<Curve>>> {
        Ok(Arc::new(StaticDkgActor {
            public_key: self.public_key,
            threshold: self.threshold,
        }))
    }
}

/// Plain map snapshot for driving the contract directly in unit tests.
#[derive(Default)]
pub struct MapSnapshot {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Snapshot for MapSnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, OrderingError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), OrderingError> {
        self.entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), OrderingError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Snapshot whose reads always fail, for the storage-failure paths.
pub struct FailingSnapshot;

impl Snapshot for FailingSnapshot {
    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, OrderingError> {
        Err(OrderingError::Storage("fake error".to_string()))
    }

    fn set(&mut self, _key: &[u8], _value: Vec<u8>) -> Result<(), OrderingError> {
        Err(OrderingError::Storage("fake error".to_string()))
    }

    fn delete(&mut self, _key: &[u8]) -> Result<(), OrderingError> {
        Err(OrderingError::Storage("fake error".to_string()))
    }
}

pub const ACCESS_KEY: [u8; 32] = [3u8; 32];
pub const ROSTER_KEY: [u8; 32] = [0u8; 32];

/// Full single-process node: contract, memory ordering, BLS signers and the
/// simulated DKG for `nodes` roster members.
pub struct TestBed {
    pub ordering: Arc<MemoryOrdering<Curve>>,
    pub signers: Vec<BlsSigner>,
    pub dkg_shares: Vec<Fr>,
    pub dkg_public_key: Curve,
    pub roster: Roster,
    nonce: AtomicU64,
}

impl TestBed {
    pub fn new(nodes: usize) -> Self {
        let mut rng = ark_std::test_rng();

        let signers: Vec<BlsSigner> = (0..nodes).map(|_| BlsSigner::random(&mut rng)).collect();
        let roster = Roster {
            members: signers
                .iter()
                .enumerate()
                .map(|(i, signer)| RosterMember {
                    address: format!("node-{i}:2001"),
                    public_key: signer.public_key(),
                })
                .collect(),
        };

        let threshold = roster.shuffle_threshold();
        let dkg = SimulatedDkg::new(nodes, threshold, &mut rng);

        let contract = FormContract::<Curve>::new(
            ACCESS_KEY.to_vec(),
            ROSTER_KEY.to_vec(),
            Arc::new(PermissiveAccess),
            Arc::new(StaticDkgRegistry {
                public_key: dkg.public_key,
                threshold: dkg.threshold,
            }),
        );

        let ordering = Arc::new(MemoryOrdering::new(contract));
        ordering.seed(&ROSTER_KEY, roster.encode());

        Self {
            ordering,
            signers,
            dkg_shares: dkg.shares,
            dkg_public_key: dkg.public_key,
            roster,
            nonce: AtomicU64::new(0),
        }
    }

    /// Build a client transaction carrying one command payload.
    pub fn tx(&self, command: Command, payload: Vec<u8>) -> Transaction {
        let mut args = BTreeMap::new();
        args.insert(
            COMMAND_ARG.to_string(),
            command.as_str().as_bytes().to_vec(),
        );
        args.insert(TRANSACTION_ARG.to_string(), payload);
        Transaction::new(
            b"client".to_vec(),
            self.nonce.fetch_add(1, Ordering::Relaxed),
            args,
        )
    }

    pub fn submit_ok(&self, tx: Transaction) {
        let result = self.ordering.submit(tx);
        assert!(result.accepted, "transaction rejected: {}", result.message);
    }

    pub fn submit_err(&self, tx: Transaction) -> String {
        let result = self.ordering.submit(tx);
        assert!(!result.accepted, "transaction unexpectedly accepted");
        result.message
    }

    pub fn form(&self, form_id: FormId) -> Form<Curve> {
        let bytes = self
            .ordering
            .get_proof(&form_id)
            .unwrap()
            .expect("form not stored");
        Form::decode(&bytes).unwrap()
    }

    /// CreateForm + OpenForm with the basic configuration; returns the id.
    pub fn create_and_open_form(&self) -> FormId {
        let create = CreateFormTransaction {
            configuration: basic_configuration(),
            admin_id: hex::encode(ADMIN),
        };
        let tx = self.tx(Command::CreateForm, serde_json::to_vec(&create).unwrap());
        let form_id = form_id_from_tx(&tx.id);
        self.submit_ok(tx);

        let open = OpenFormTransaction {
            form_id: hex::encode(form_id),
        };
        self.submit_ok(self.tx(Command::OpenForm, serde_json::to_vec(&open).unwrap()));

        form_id
    }
}

/// Encrypt a plaintext ballot for the form's threshold key, chunked to the
/// form's chunk count.
pub fn marshall_ballot(bed: &TestBed, form_id: FormId, plaintext: &[u8]) -> Ciphervote<Curve> {
    let form = bed.form(form_id);
    let pubkey = form.pubkey.expect("form has no public key");
    let mut rng = ark_std::test_rng();
    encrypt_chunked(plaintext, form.chunks_per_ballot(), pubkey, &mut rng).unwrap()
}

pub fn cast_vote_tx(
    bed: &TestBed,
    form_id: FormId,
    user_id: &str,
    ballot: Ciphervote<Curve>,
) -> Transaction {
    let payload = CastVoteTransaction::<Curve> {
        form_id: hex::encode(form_id),
        user_id: user_id.to_string(),
        ballot,
    };
    bed.tx(Command::CastVote, serde_json::to_vec(&payload).unwrap())
}

pub fn close_form_tx(bed: &TestBed, form_id: FormId) -> Transaction {
    let payload = CloseFormTransaction {
        form_id: hex::encode(form_id),
        user_id: hex::encode(ADMIN),
    };
    bed.tx(Command::CloseForm, serde_json::to_vec(&payload).unwrap())
}

pub fn combine_shares_tx(bed: &TestBed, form_id: FormId) -> Transaction {
    let payload = CombineSharesTransaction {
        form_id: hex::encode(form_id),
        user_id: hex::encode(ADMIN),
    };
    bed.tx(Command::CombineShares, serde_json::to_vec(&payload).unwrap())
}
