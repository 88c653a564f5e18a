pub mod generators;
pub mod proof;

use ark_ec::CurveGroup;
use ark_std::rand::Rng;
use ark_std::UniformRand;

pub use proof::{ShuffleProof, PROTOCOL_NAME};

use super::elgamal::{Ciphervote, ElGamalCiphertext};
use super::CryptoError;

/// Witness of one sequences shuffle: a single permutation applied to every
/// chunk column, plus the per-position re-encryption randomness.
pub struct SequenceShuffleWitness<C: CurveGroup> {
    /// `output[i] = reencrypt(input[permutation[i]])`.
    pub permutation: Vec<usize>,
    /// `rerandomizations[i][j]` re-encrypts chunk `j` of output position `i`.
    pub rerandomizations: Vec<Vec<C::ScalarField>>,
}

/// Fisher-Yates permutation draw.
pub fn random_permutation<R: Rng>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut permutation: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        permutation.swap(i, j);
    }
    permutation
}

/// Shuffle a column of ciphervotes: one secret permutation across all chunk
/// columns, fresh re-encryption randomness per (position, chunk).
pub fn shuffle_sequences<C, R>(
    input: &[Ciphervote<C>],
    public_key: C,
    rng: &mut R,
) -> (Vec<Ciphervote<C>>, SequenceShuffleWitness<C>)
where
    C: CurveGroup,
    R: Rng,
{
    let permutation = random_permutation(input.len(), rng);

    let mut output = Vec::with_capacity(input.len());
    let mut rerandomizations = Vec::with_capacity(input.len());
    for &source in &permutation {
        let mut row = Vec::with_capacity(input[source].len());
        let mut shuffled = Vec::with_capacity(input[source].len());
        for chunk in &input[source] {
            let randomness = C::ScalarField::rand(rng);
            shuffled.push(chunk.add_layer(randomness, public_key));
            row.push(randomness);
        }
        output.push(shuffled);
        rerandomizations.push(row);
    }

    (
        output,
        SequenceShuffleWitness {
            permutation,
            rerandomizations,
        },
    )
}

fn check_column_shape<C: CurveGroup>(
    column: &[Ciphervote<C>],
    chunks: usize,
) -> Result<(), CryptoError> {
    if column.iter().any(|vote| vote.len() != chunks) {
        return Err(CryptoError::ShuffleRejected("ragged ciphertext column"));
    }
    Ok(())
}

/// Collapse the chunk columns into a single pair column with the challenge
/// vector `e`: position `i` becomes `Σ_j e_j · pair_{i,j}`.
fn collapse_column<C: CurveGroup>(
    column: &[Ciphervote<C>],
    e: &[C::ScalarField],
) -> Vec<ElGamalCiphertext<C>> {
    column
        .iter()
        .map(|vote| {
            let mut k = C::zero();
            let mut c = C::zero();
            for (chunk, weight) in vote.iter().zip(e.iter()) {
                k += chunk.k * *weight;
                c += chunk.c * *weight;
            }
            ElGamalCiphertext::new(k, c)
        })
        .collect()
}

/// Prove one sequences shuffle under the challenge vector `e` (one weight per
/// chunk column). The collapsed columns reduce to a single pair-column
/// shuffle with combined randomness `Σ_j e_j·r_{i,j}`.
pub fn prove_sequence_shuffle<C, R>(
    witness: &SequenceShuffleWitness<C>,
    input: &[Ciphervote<C>],
    output: &[Ciphervote<C>],
    public_key: C,
    e: &[C::ScalarField],
    rng: &mut R,
) -> Result<ShuffleProof<C>, CryptoError>
where
    C: CurveGroup,
    R: Rng,
{
    check_column_shape(input, e.len())?;
    check_column_shape(output, e.len())?;

    let collapsed_input = collapse_column(input, e);
    let collapsed_output = collapse_column(output, e);
    let collapsed_rerandomizations: Vec<C::ScalarField> = witness
        .rerandomizations
        .iter()
        .map(|row| {
            row.iter()
                .zip(e.iter())
                .map(|(randomness, weight)| *randomness * *weight)
                .sum()
        })
        .collect();

    proof::prove(
        &collapsed_input,
        &collapsed_output,
        public_key,
        &witness.permutation,
        &collapsed_rerandomizations,
        rng,
    )
}

/// Verify a sequences shuffle under the challenge vector `e`.
pub fn verify_sequence_shuffle<C: CurveGroup>(
    input: &[Ciphervote<C>],
    output: &[Ciphervote<C>],
    public_key: C,
    e: &[C::ScalarField],
    proof: &ShuffleProof<C>,
) -> Result<(), CryptoError> {
    if input.len() != output.len() {
        return Err(CryptoError::ShuffleRejected("dimension mismatch"));
    }
    check_column_shape(input, e.len())?;
    check_column_shape(output, e.len())?;

    let collapsed_input = collapse_column(input, e);
    let collapsed_output = collapse_column(output, e);
    proof::verify(&collapsed_input, &collapsed_output, public_key, proof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::elgamal::{encrypt_chunked, ElGamalKeys, PointEmbedding};
    use crate::crypto::stream::derive_scalars;
    use ark_ed25519::{EdwardsProjective as Curve, Fr};
    use ark_std::{test_rng, UniformRand, Zero};

    fn sample_votes(
        messages: &[&[u8]],
        chunks: usize,
        public_key: Curve,
        rng: &mut impl Rng,
    ) -> Vec<Ciphervote<Curve>> {
        messages
            .iter()
            .map(|message| encrypt_chunked(message, chunks, public_key, rng).unwrap())
            .collect()
    }

    #[test]
    fn permutation_draw_is_a_bijection() {
        let mut rng = test_rng();
        let permutation = random_permutation(20, &mut rng);
        let mut sorted = permutation.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn sequence_shuffle_proof_round_trip() {
        let mut rng = test_rng();
        let keys = ElGamalKeys::<Curve>::new(Fr::rand(&mut rng));

        let input = sample_votes(
            &[b"yes", b"ja", b"oui", b"si"],
            2,
            keys.public_key,
            &mut rng,
        );
        let (output, witness) = shuffle_sequences(&input, keys.public_key, &mut rng);

        let e: Vec<Fr> = derive_scalars(b"round-fingerprint", 2);
        let proof =
            prove_sequence_shuffle(&witness, &input, &output, keys.public_key, &e, &mut rng)
                .unwrap();
        verify_sequence_shuffle(&input, &output, keys.public_key, &e, &proof).unwrap();
    }

    #[test]
    fn shuffled_votes_decrypt_to_the_same_multiset() {
        let mut rng = test_rng();
        let keys = ElGamalKeys::<Curve>::new(Fr::rand(&mut rng));

        let messages: Vec<&[u8]> = vec![b"yes", b"ja", b"no"];
        let input = sample_votes(&messages, 1, keys.public_key, &mut rng);
        let (output, _witness) = shuffle_sequences(&input, keys.public_key, &mut rng);

        let mut decrypted: Vec<Vec<u8>> = output
            .iter()
            .map(|vote| {
                let point = vote[0].c - vote[0].k * keys.private_key;
                point.extract().unwrap()
            })
            .collect();
        decrypted.sort();

        let mut expected: Vec<Vec<u8>> = messages.iter().map(|m| m.to_vec()).collect();
        expected.sort();
        assert_eq!(decrypted, expected);
    }

    #[test]
    fn wrong_challenge_vector_rejects() {
        let mut rng = test_rng();
        let keys = ElGamalKeys::<Curve>::new(Fr::rand(&mut rng));

        let input = sample_votes(&[b"yes", b"ja"], 2, keys.public_key, &mut rng);
        let (output, witness) = shuffle_sequences(&input, keys.public_key, &mut rng);

        let e: Vec<Fr> = derive_scalars(b"round-fingerprint", 2);
        let proof =
            prove_sequence_shuffle(&witness, &input, &output, keys.public_key, &e, &mut rng)
                .unwrap();

        let other: Vec<Fr> = derive_scalars(b"different-fingerprint", 2);
        assert!(
            verify_sequence_shuffle(&input, &output, keys.public_key, &other, &proof).is_err()
        );
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let mut rng = test_rng();
        let keys = ElGamalKeys::<Curve>::new(Fr::rand(&mut rng));

        let mut input = sample_votes(&[b"yes", b"ja"], 2, keys.public_key, &mut rng);
        let (output, witness) = shuffle_sequences(&input, keys.public_key, &mut rng);
        input[1].pop();

        let e: Vec<Fr> = derive_scalars(b"round-fingerprint", 2);
        assert!(
            prove_sequence_shuffle(&witness, &input, &output, keys.public_key, &e, &mut rng)
                .is_err()
        );
        let proof = ShuffleProof {
            permutation_commitments: Vec::new(),
            chain_commitments: Vec::new(),
            t1: Curve::zero(),
            t2: Curve::zero(),
            t3: Curve::zero(),
            t4_k: Curve::zero(),
            t4_c: Curve::zero(),
            t_hat: Vec::new(),
            s1: Fr::from(0u64),
            s2: Fr::from(0u64),
            s3: Fr::from(0u64),
            s4: Fr::from(0u64),
            s_hat: Vec::new(),
            s_tilde: Vec::new(),
        };
        assert!(
            verify_sequence_shuffle(&input, &output, keys.public_key, &e, &proof).is_err()
        );
    }
}
