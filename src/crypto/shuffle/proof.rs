use ark_ec::CurveGroup;
use ark_ff::One;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::rand::Rng;
use ark_std::UniformRand;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::generators::derive_generators;
use crate::codec::CanonicalWriter;
use crate::crypto::elgamal::ElGamalCiphertext;
use crate::crypto::stream::SemiRandomStream;
use crate::crypto::CryptoError;

/// Protocol name string separating this proof's transcript from every other
/// hash use in the system.
pub const PROTOCOL_NAME: &str = "mixtally/sequences-shuffle/v1";

/// Argument that one pair column is a re-encryption shuffle of another.
///
/// The prover commits to the permutation (`c_i = r_i·G + h_{π(i)}` over
/// independently derived generators), chains the permuted challenges into
/// product commitments, and answers one linked sigma challenge covering the
/// commitment openings and the re-encryption consistency of the column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: CanonicalSerialize, C::ScalarField: CanonicalSerialize",
    deserialize = "C: CanonicalDeserialize, C::ScalarField: CanonicalDeserialize"
))]
pub struct ShuffleProof<C: CurveGroup> {
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub permutation_commitments: Vec<C>,
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub chain_commitments: Vec<C>,
    #[serde(with = "crate::crypto_serde::element")]
    pub t1: C,
    #[serde(with = "crate::crypto_serde::element")]
    pub t2: C,
    #[serde(with = "crate::crypto_serde::element")]
    pub t3: C,
    #[serde(with = "crate::crypto_serde::element")]
    pub t4_k: C,
    #[serde(with = "crate::crypto_serde::element")]
    pub t4_c: C,
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub t_hat: Vec<C>,
    #[serde(with = "crate::crypto_serde::element")]
    pub s1: C::ScalarField,
    #[serde(with = "crate::crypto_serde::element")]
    pub s2: C::ScalarField,
    #[serde(with = "crate::crypto_serde::element")]
    pub s3: C::ScalarField,
    #[serde(with = "crate::crypto_serde::element")]
    pub s4: C::ScalarField,
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub s_hat: Vec<C::ScalarField>,
    #[serde(with = "crate::crypto_serde::element_vec")]
    pub s_tilde: Vec<C::ScalarField>,
}

fn append_pairs<C: CurveGroup>(writer: &mut CanonicalWriter, pairs: &[ElGamalCiphertext<C>]) {
    writer.append_u32(pairs.len() as u32);
    for pair in pairs {
        writer.append_element(&pair.k);
        writer.append_element(&pair.c);
    }
}

fn append_points<C: CurveGroup>(writer: &mut CanonicalWriter, points: &[C]) {
    writer.append_u32(points.len() as u32);
    for point in points {
        writer.append_element(point);
    }
}

/// Per-position challenges `u`, bound to the statement and the permutation
/// commitments.
fn challenge_u<C: CurveGroup>(
    public_key: C,
    inputs: &[ElGamalCiphertext<C>],
    outputs: &[ElGamalCiphertext<C>],
    permutation_commitments: &[C],
) -> Vec<C::ScalarField> {
    let mut writer = CanonicalWriter::new("shuffle/challenge-u");
    writer.append_str(PROTOCOL_NAME);
    writer.append_element(&public_key);
    append_pairs(&mut writer, inputs);
    append_pairs(&mut writer, outputs);
    append_points(&mut writer, permutation_commitments);

    let seed: [u8; 32] = Sha256::digest(writer.finish()).into();
    let mut stream = SemiRandomStream::new(&seed);
    (0..inputs.len()).map(|_| stream.pick_scalar()).collect()
}

/// Sigma challenge, bound to the full transcript including the prover's
/// commitment round.
fn challenge_chi<C: CurveGroup>(
    public_key: C,
    inputs: &[ElGamalCiphertext<C>],
    outputs: &[ElGamalCiphertext<C>],
    proof_points: (&[C], &[C], C, C, C, C, C, &[C]),
) -> C::ScalarField {
    let (permutation_commitments, chain_commitments, t1, t2, t3, t4_k, t4_c, t_hat) = proof_points;

    let mut writer = CanonicalWriter::new("shuffle/challenge-chi");
    writer.append_str(PROTOCOL_NAME);
    writer.append_element(&public_key);
    append_pairs(&mut writer, inputs);
    append_pairs(&mut writer, outputs);
    append_points(&mut writer, permutation_commitments);
    append_points(&mut writer, chain_commitments);
    writer.append_element(&t1);
    writer.append_element(&t2);
    writer.append_element(&t3);
    writer.append_element(&t4_k);
    writer.append_element(&t4_c);
    append_points(&mut writer, t_hat);

    let seed: [u8; 32] = Sha256::digest(writer.finish()).into();
    SemiRandomStream::new(&seed).pick_scalar()
}

/// Produce a shuffle proof for `outputs[i] = reencrypt(inputs[π(i)], r̃_i)`.
pub fn prove<C, R>(
    inputs: &[ElGamalCiphertext<C>],
    outputs: &[ElGamalCiphertext<C>],
    public_key: C,
    permutation: &[usize],
    rerandomizations: &[C::ScalarField],
    rng: &mut R,
) -> Result<ShuffleProof<C>, CryptoError>
where
    C: CurveGroup,
    R: Rng,
{
    let n = inputs.len();
    if n == 0 {
        return Err(CryptoError::ShuffleRejected("empty column"));
    }
    if outputs.len() != n || permutation.len() != n || rerandomizations.len() != n {
        return Err(CryptoError::ShuffleRejected("dimension mismatch"));
    }
    let mut seen = vec![false; n];
    for &target in permutation {
        if target >= n || seen[target] {
            return Err(CryptoError::ShuffleRejected("invalid permutation"));
        }
        seen[target] = true;
    }

    let generator = C::generator();
    let generators = derive_generators::<C>(n + 1);
    let chain_base = generators[0];
    let hs = &generators[1..];

    // Permutation commitments c_i = r_i·G + h_{π(i)}.
    let r: Vec<C::ScalarField> = (0..n).map(|_| C::ScalarField::rand(rng)).collect();
    let permutation_commitments: Vec<C> = (0..n)
        .map(|i| generator * r[i] + hs[permutation[i]])
        .collect();

    let u = challenge_u(public_key, inputs, outputs, &permutation_commitments);
    let u_tilde: Vec<C::ScalarField> = (0..n).map(|i| u[permutation[i]]).collect();

    // Chained commitments ĉ_i = r̂_i·G + ũ_i·ĉ_{i-1}, ĉ_0 = chain base.
    let r_hat_terms: Vec<C::ScalarField> = (0..n).map(|_| C::ScalarField::rand(rng)).collect();
    let mut chain_commitments = Vec::with_capacity(n);
    let mut previous = chain_base;
    for i in 0..n {
        let next = generator * r_hat_terms[i] + previous * u_tilde[i];
        chain_commitments.push(next);
        previous = next;
    }

    // Aggregated witnesses.
    let r_bar: C::ScalarField = r.iter().copied().sum();
    let mut suffix = vec![C::ScalarField::one(); n + 1];
    for i in (0..n).rev() {
        suffix[i] = suffix[i + 1] * u_tilde[i];
    }
    let r_hat: C::ScalarField = (0..n).map(|i| r_hat_terms[i] * suffix[i + 1]).sum();
    let r3: C::ScalarField = (0..n).map(|i| r[i] * u_tilde[i]).sum();
    let r4: C::ScalarField = (0..n).map(|i| rerandomizations[i] * u_tilde[i]).sum();

    // Commitment round.
    let w1 = C::ScalarField::rand(rng);
    let w2 = C::ScalarField::rand(rng);
    let w3 = C::ScalarField::rand(rng);
    let w4 = C::ScalarField::rand(rng);
    let w_hat: Vec<C::ScalarField> = (0..n).map(|_| C::ScalarField::rand(rng)).collect();
    let w_tilde: Vec<C::ScalarField> = (0..n).map(|_| C::ScalarField::rand(rng)).collect();

    let t1 = generator * w1;
    let t2 = generator * w2;
    let mut t3 = -(generator * w3);
    let mut t4_k = -(generator * w4);
    let mut t4_c = -(public_key * w4);
    for i in 0..n {
        t3 += permutation_commitments[i] * w_tilde[i];
        t4_k += outputs[i].k * w_tilde[i];
        t4_c += outputs[i].c * w_tilde[i];
    }
    let mut t_hat = Vec::with_capacity(n);
    for i in 0..n {
        let base = if i == 0 {
            chain_base
        } else {
            chain_commitments[i - 1]
        };
        t_hat.push(generator * w_hat[i] + base * w_tilde[i]);
    }

    let chi = challenge_chi(
        public_key,
        inputs,
        outputs,
        (
            &permutation_commitments,
            &chain_commitments,
            t1,
            t2,
            t3,
            t4_k,
            t4_c,
            &t_hat,
        ),
    );

    // Response round.
    let s1 = w1 + chi * r_bar;
    let s2 = w2 + chi * r_hat;
    let s3 = w3 + chi * r3;
    let s4 = w4 + chi * r4;
    let s_hat: Vec<C::ScalarField> = (0..n).map(|i| w_hat[i] + chi * r_hat_terms[i]).collect();
    let s_tilde: Vec<C::ScalarField> = (0..n).map(|i| w_tilde[i] + chi * u_tilde[i]).collect();

    Ok(ShuffleProof {
        permutation_commitments,
        chain_commitments,
        t1,
        t2,
        t3,
        t4_k,
        t4_c,
        t_hat,
        s1,
        s2,
        s3,
        s4,
        s_hat,
        s_tilde,
    })
}

/// Verify a shuffle proof against the input and output pair columns.
pub fn verify<C: CurveGroup>(
    inputs: &[ElGamalCiphertext<C>],
    outputs: &[ElGamalCiphertext<C>],
    public_key: C,
    proof: &ShuffleProof<C>,
) -> Result<(), CryptoError> {
    let n = inputs.len();
    if n == 0 {
        return Err(CryptoError::ShuffleRejected("empty column"));
    }
    if outputs.len() != n {
        return Err(CryptoError::ShuffleRejected("dimension mismatch"));
    }
    if proof.permutation_commitments.len() != n
        || proof.chain_commitments.len() != n
        || proof.t_hat.len() != n
        || proof.s_hat.len() != n
        || proof.s_tilde.len() != n
    {
        return Err(CryptoError::ShuffleRejected("malformed proof"));
    }

    let generator = C::generator();
    let generators = derive_generators::<C>(n + 1);
    let chain_base = generators[0];
    let hs = &generators[1..];

    let u = challenge_u(public_key, inputs, outputs, &proof.permutation_commitments);
    let chi = challenge_chi(
        public_key,
        inputs,
        outputs,
        (
            &proof.permutation_commitments,
            &proof.chain_commitments,
            proof.t1,
            proof.t2,
            proof.t3,
            proof.t4_k,
            proof.t4_c,
            &proof.t_hat,
        ),
    );

    // (1) The commitments open to the full generator set:
    //     Σc_i − Σh_i = r̄·G.
    let mut v1 = C::zero();
    for i in 0..n {
        v1 += proof.permutation_commitments[i] - hs[i];
    }
    if generator * proof.s1 != proof.t1 + v1 * chi {
        return Err(CryptoError::ShuffleRejected("commitment sum check failed"));
    }

    // (2) The chained commitments carry the product of all challenges:
    //     ĉ_n − (Πu_i)·ĉ_0 = r̂·G.
    let u_product: C::ScalarField = u.iter().copied().product();
    let v2 = proof.chain_commitments[n - 1] - chain_base * u_product;
    if generator * proof.s2 != proof.t2 + v2 * chi {
        return Err(CryptoError::ShuffleRejected(
            "challenge product check failed",
        ));
    }

    // (3) The permuted challenges open the commitments onto Σu_j·h_j.
    let mut v3 = C::zero();
    let mut lhs3 = -(generator * proof.s3);
    for i in 0..n {
        v3 += hs[i] * u[i];
        lhs3 += proof.permutation_commitments[i] * proof.s_tilde[i];
    }
    if lhs3 != proof.t3 + v3 * chi {
        return Err(CryptoError::ShuffleRejected(
            "challenge permutation check failed",
        ));
    }

    // (4) Re-encryption consistency on both ciphertext components:
    //     Σũ_i·out_i − r̃·(G|P) = Σu_j·in_j.
    let mut v4_k = C::zero();
    let mut v4_c = C::zero();
    let mut lhs4_k = -(generator * proof.s4);
    let mut lhs4_c = -(public_key * proof.s4);
    for i in 0..n {
        v4_k += inputs[i].k * u[i];
        v4_c += inputs[i].c * u[i];
        lhs4_k += outputs[i].k * proof.s_tilde[i];
        lhs4_c += outputs[i].c * proof.s_tilde[i];
    }
    if lhs4_k != proof.t4_k + v4_k * chi {
        return Err(CryptoError::ShuffleRejected(
            "reencryption check failed on K",
        ));
    }
    if lhs4_c != proof.t4_c + v4_c * chi {
        return Err(CryptoError::ShuffleRejected(
            "reencryption check failed on C",
        ));
    }

    // (5) Every chain link is well formed.
    for i in 0..n {
        let base = if i == 0 {
            chain_base
        } else {
            proof.chain_commitments[i - 1]
        };
        let lhs = generator * proof.s_hat[i] + base * proof.s_tilde[i];
        if lhs != proof.t_hat[i] + proof.chain_commitments[i] * chi {
            return Err(CryptoError::ShuffleRejected("chain link check failed"));
        }
    }

    Ok(())
}
