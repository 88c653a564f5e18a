use ark_ec::{AffineRepr, CurveGroup};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::crypto::stream::SemiRandomStream;

const GENERATOR_DOMAIN: &[u8] = b"mixtally/shuffle/generators/v1";

/// Derives `count` independent group elements by rejection-sampling
/// compressed point encodings from the deterministic stream. Nobody knows
/// discrete-log relations among them (or to the standard generator), which
/// the permutation commitments rely on.
///
/// The derivation is a pure function of `count`, so prover and verifier
/// agree on the vector without exchanging it.
pub fn derive_generators<C: CurveGroup>(count: usize) -> Vec<C> {
    let mut stream = SemiRandomStream::new(GENERATOR_DOMAIN);
    let size = C::Affine::generator().compressed_size();

    let mut generators = Vec::with_capacity(count);
    let mut candidate = vec![0u8; size];
    while generators.len() < count {
        stream.fill_bytes(&mut candidate);
        let Ok(point) = C::Affine::deserialize_compressed(&candidate[..]) else {
            continue;
        };
        if point.is_zero() {
            continue;
        }
        generators.push(point.into_group());
    }
    generators
}
