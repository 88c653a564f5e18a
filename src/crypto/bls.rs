use ark_bls12_381::{Bls12_381, Fq, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup, PrimeGroup};
use ark_ff::Field;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::rand::Rng;
use ark_std::UniformRand;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::stream::SemiRandomStream;
use super::CryptoError;

/// Compressed G2 public key length.
pub const PUBLIC_KEY_LENGTH: usize = 96;
/// Compressed G1 signature length.
pub const SIGNATURE_LENGTH: usize = 48;

const HASH_DOMAIN: &[u8] = b"mixtally/bls12381-sha256/v1";

/// BLS12-381 short-signature signer held by every roster node. Signatures
/// live in G1 (48 bytes), public keys in G2 (96 bytes).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BlsSigner {
    secret: Fr,
}

impl BlsSigner {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            secret: Fr::rand(rng),
        }
    }

    pub fn public_key(&self) -> Vec<u8> {
        let point = (G2Projective::generator() * self.secret).into_affine();
        let mut bytes = Vec::with_capacity(PUBLIC_KEY_LENGTH);
        point
            .serialize_compressed(&mut bytes)
            .expect("compressed point serialization should not fail");
        bytes
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let digest = hash_to_g1(message);
        let signature = (G1Projective::from(digest) * self.secret).into_affine();
        let mut bytes = Vec::with_capacity(SIGNATURE_LENGTH);
        signature
            .serialize_compressed(&mut bytes)
            .expect("compressed point serialization should not fail");
        bytes
    }
}

/// Verifies a signature over `message` under a compressed G2 public key.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    if public_key.len() != PUBLIC_KEY_LENGTH {
        return Err(CryptoError::MalformedPublicKey);
    }
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::MalformedSignature);
    }

    let pk = G2Affine::deserialize_compressed(public_key)
        .map_err(|_| CryptoError::MalformedPublicKey)?;
    let sig =
        G1Affine::deserialize_compressed(signature).map_err(|_| CryptoError::MalformedSignature)?;

    let digest = hash_to_g1(message);
    let lhs = Bls12_381::pairing(sig, G2Affine::generator());
    let rhs = Bls12_381::pairing(digest, pk);
    if lhs == rhs {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}

/// Deterministic try-and-increment hash onto the prime-order G1 subgroup.
/// Signer and verifier derive the same point, which is all the scheme needs.
fn hash_to_g1(message: &[u8]) -> G1Affine {
    let mut seed = Vec::with_capacity(HASH_DOMAIN.len() + message.len());
    seed.extend_from_slice(HASH_DOMAIN);
    seed.extend_from_slice(message);
    let mut stream = SemiRandomStream::new(&seed);

    loop {
        let x: Fq = stream.pick_scalar();
        // G1: y² = x³ + 4
        let y_sq = x.square() * x + Fq::from(4u64);
        let Some(y) = y_sq.sqrt() else {
            continue;
        };
        let candidate = G1Affine::new_unchecked(x, y).mul_by_cofactor();
        if candidate.is_zero() {
            continue;
        }
        return candidate;
    }
}
