use ark_ec::twisted_edwards::{Affine, Projective, TECurveConfig};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, Field, One, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::rand::Rng;
use ark_std::UniformRand;
use serde::{Deserialize, Serialize};

use super::CryptoError;

/// An ElGamal ciphertext `(K, C)` over the suite group, written additively:
/// `K = k·G`, `C = M + k·P` for message point `M` and threshold key `P`.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, CanonicalSerialize, CanonicalDeserialize,
)]
#[serde(bound(
    serialize = "C: CanonicalSerialize",
    deserialize = "C: CanonicalDeserialize"
))]
pub struct ElGamalCiphertext<C: CurveGroup> {
    #[serde(with = "crate::crypto_serde::element")]
    pub k: C,
    #[serde(with = "crate::crypto_serde::element")]
    pub c: C,
}

impl<C: CurveGroup> ElGamalCiphertext<C> {
    pub fn new(k: C, c: C) -> Self {
        Self { k, c }
    }

    /// Encrypt a message point under `public_key` with the given randomness.
    pub fn encrypt(message: C, randomness: C::ScalarField, public_key: C) -> Self {
        let identity = C::zero();
        Self::new(identity, message).add_layer(randomness, public_key)
    }

    /// Re-encryption: add a fresh encryption of zero on top of this
    /// ciphertext. The plaintext is unchanged.
    pub fn add_layer(&self, randomness: C::ScalarField, public_key: C) -> Self {
        let generator = C::generator();
        Self {
            k: self.k + generator * randomness,
            c: self.c + public_key * randomness,
        }
    }
}

/// One ballot encrypted as `chunks_per_ballot` ciphertext chunks.
pub type Ciphervote<C> = Vec<ElGamalCiphertext<C>>;

#[derive(Clone, Debug)]
pub struct ElGamalKeys<C: CurveGroup> {
    pub private_key: C::ScalarField,
    pub public_key: C,
}

impl<C: CurveGroup> ElGamalKeys<C> {
    pub fn new(private_key: C::ScalarField) -> Self {
        let public_key = C::generator() * private_key;
        Self {
            private_key,
            public_key,
        }
    }
}

/// Embedding of short byte strings into group elements, with exact recovery.
///
/// The suite group must support writing a length-tagged buffer into a point
/// coordinate; Edwards 25519 carries up to 29 bytes per point.
pub trait PointEmbedding: CurveGroup {
    /// Maximum number of data bytes one point can carry.
    fn embed_capacity() -> usize;

    /// Embed `data` into a fresh point. Padding is drawn from `rng`, so two
    /// embeddings of the same bytes are distinct points.
    fn embed<R: Rng>(data: &[u8], rng: &mut R) -> Result<Self, CryptoError>;

    /// Recover the embedded bytes.
    fn extract(&self) -> Result<Vec<u8>, CryptoError>;
}

const EMBED_ATTEMPTS: usize = 10_000;

impl<P> PointEmbedding for Projective<P>
where
    P: TECurveConfig,
    P::BaseField: PrimeField,
{
    fn embed_capacity() -> usize {
        // One byte holds the data length and one byte of headroom absorbs the
        // modulus mask, leaving (bits - 16) / 8 usable bytes (29 on Edwards
        // 25519).
        ((P::BaseField::MODULUS_BIT_SIZE - 16) / 8) as usize
    }

    fn embed<R: Rng>(data: &[u8], rng: &mut R) -> Result<Self, CryptoError> {
        let capacity = Self::embed_capacity();
        if data.len() > capacity {
            return Err(CryptoError::MessageTooLong {
                len: data.len(),
                max: capacity,
            });
        }

        let byte_len = ((P::BaseField::MODULUS_BIT_SIZE + 7) / 8) as usize;
        let top_bits = (P::BaseField::MODULUS_BIT_SIZE as usize - 1) - 8 * (byte_len - 1);
        let top_mask = (1u8 << top_bits) - 1;

        let mut buf = vec![0u8; byte_len];
        buf[0] = data.len() as u8;
        buf[1..1 + data.len()].copy_from_slice(data);

        for _ in 0..EMBED_ATTEMPTS {
            rng.fill_bytes(&mut buf[1 + data.len()..]);
            // Keep the candidate below 2^(bits-1) <= modulus so the byte
            // round trip through the y coordinate is exact.
            buf[byte_len - 1] &= top_mask;

            let y = P::BaseField::from_le_bytes_mod_order(&buf);

            // a·x² + y² = 1 + d·x²·y²  =>  x² = (1 - y²) / (a - d·y²)
            let y_sq = y.square();
            let denominator = P::COEFF_A - P::COEFF_D * y_sq;
            let Some(inv) = denominator.inverse() else {
                continue;
            };
            let x_sq = (P::BaseField::one() - y_sq) * inv;
            let Some(x) = x_sq.sqrt() else {
                continue;
            };

            let candidate = Affine::<P>::new_unchecked(x, y);
            if !candidate.is_on_curve() {
                continue;
            }
            if !candidate.is_in_correct_subgroup_assuming_on_curve() {
                continue;
            }
            return Ok(candidate.into_group());
        }

        Err(CryptoError::EmbeddingFailed)
    }

    fn extract(&self) -> Result<Vec<u8>, CryptoError> {
        let affine = self.into_affine();
        let bytes = affine.y.into_bigint().to_bytes_le();
        let len = bytes[0] as usize;
        if len > Self::embed_capacity() || 1 + len > bytes.len() {
            return Err(CryptoError::InvalidEmbedding);
        }
        Ok(bytes[1..1 + len].to_vec())
    }
}

/// Encrypt `message` into exactly `chunks` ciphertexts, reading up to the
/// embedding capacity per chunk. Short messages leave later chunks empty.
pub fn encrypt_chunked<C, R>(
    message: &[u8],
    chunks: usize,
    public_key: C,
    rng: &mut R,
) -> Result<Ciphervote<C>, CryptoError>
where
    C: PointEmbedding,
    R: Rng,
{
    let capacity = C::embed_capacity();
    let mut ballot = Vec::with_capacity(chunks);

    for chunk in 0..chunks {
        let start = (chunk * capacity).min(message.len());
        let end = ((chunk + 1) * capacity).min(message.len());
        let embedded = C::embed(&message[start..end], rng)?;
        let randomness = C::ScalarField::rand(rng);
        ballot.push(ElGamalCiphertext::encrypt(embedded, randomness, public_key));
    }

    Ok(ballot)
}

/// One node's decryption share for a single chunk: `x_i · K`.
pub fn decryption_share<C: CurveGroup>(
    secret_share: C::ScalarField,
    chunk: &ElGamalCiphertext<C>,
) -> C {
    chunk.k * secret_share
}
