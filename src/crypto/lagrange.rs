use ark_ec::CurveGroup;
use ark_ff::PrimeField;

use super::CryptoError;

/// Lagrange coefficients evaluated at zero for the given share indices.
///
/// Share index `i` sits at x-coordinate `i + 1`, matching the sharing used by
/// the DKG output, so the denominators never vanish for distinct indices.
pub fn lagrange_coefficients_at_zero<F: PrimeField>(
    indices: &[usize],
) -> Result<Vec<F>, CryptoError> {
    for (pos, index) in indices.iter().enumerate() {
        if indices[..pos].contains(index) {
            return Err(CryptoError::DuplicateShareIndex(*index));
        }
    }

    let xs: Vec<F> = indices.iter().map(|i| F::from(*i as u64 + 1)).collect();

    let mut coefficients = Vec::with_capacity(xs.len());
    for (i, xi) in xs.iter().enumerate() {
        let mut numerator = F::one();
        let mut denominator = F::one();
        for (j, xj) in xs.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator *= *xj;
            denominator *= *xj - *xi;
        }
        let inv = denominator
            .inverse()
            .ok_or(CryptoError::DuplicateShareIndex(indices[i]))?;
        coefficients.push(numerator * inv);
    }

    Ok(coefficients)
}

/// Recombine `threshold` decryption shares `(index, x_index · K)` into the
/// shared secret point `S = Σ λ_index · share_index`.
pub fn recover_secret_point<C: CurveGroup>(shares: &[(usize, C)]) -> Result<C, CryptoError> {
    if shares.is_empty() {
        return Err(CryptoError::NotEnoughShares { got: 0, needed: 1 });
    }

    let indices: Vec<usize> = shares.iter().map(|(i, _)| *i).collect();
    let coefficients = lagrange_coefficients_at_zero::<C::ScalarField>(&indices)?;

    let mut secret = C::zero();
    for ((_, share), coefficient) in shares.iter().zip(coefficients.iter()) {
        secret += *share * *coefficient;
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::elgamal::{decryption_share, ElGamalCiphertext, PointEmbedding};
    use ark_ec::PrimeGroup;
    use ark_ed25519::{EdwardsProjective as Curve, Fr};
    use ark_std::{test_rng, UniformRand};

    /// Shamir sharing of a fresh secret: returns the group key and one share
    /// per node, threshold t.
    fn share_secret(n: usize, t: usize, rng: &mut impl ark_std::rand::Rng) -> (Curve, Vec<Fr>) {
        let coefficients: Vec<Fr> = (0..t).map(|_| Fr::rand(rng)).collect();
        let eval = |x: Fr| {
            let mut acc = Fr::from(0u64);
            for c in coefficients.iter().rev() {
                acc = acc * x + c;
            }
            acc
        };
        let public_key = Curve::generator() * coefficients[0];
        let shares = (0..n).map(|i| eval(Fr::from(i as u64 + 1))).collect();
        (public_key, shares)
    }

    #[test]
    fn coefficients_sum_to_one() {
        let coefficients = lagrange_coefficients_at_zero::<Fr>(&[0, 3, 5]).unwrap();
        let sum: Fr = coefficients.iter().sum();
        assert_eq!(sum, Fr::from(1u64));
    }

    #[test]
    fn duplicate_indices_are_rejected() {
        let err = lagrange_coefficients_at_zero::<Fr>(&[0, 1, 1]).unwrap_err();
        assert!(matches!(err, CryptoError::DuplicateShareIndex(1)));
    }

    #[test]
    fn threshold_decryption_round_trip() {
        let mut rng = test_rng();
        let (public_key, shares) = share_secret(5, 3, &mut rng);

        let message = Curve::embed(b"threshold message", &mut rng).unwrap();
        let cipher = ElGamalCiphertext::encrypt(message, Fr::rand(&mut rng), public_key);

        // Any three distinct shares recover the plaintext.
        for subset in [[0usize, 1, 2], [1, 3, 4], [4, 2, 0]] {
            let pub_shares: Vec<(usize, Curve)> = subset
                .iter()
                .map(|&i| (i, decryption_share(shares[i], &cipher)))
                .collect();
            let secret = recover_secret_point(&pub_shares).unwrap();
            let recovered = cipher.c - secret;
            assert_eq!(recovered.extract().unwrap(), b"threshold message");
        }
    }

    #[test]
    fn too_few_shares_fail_to_recover() {
        let mut rng = test_rng();
        let (public_key, shares) = share_secret(5, 3, &mut rng);

        let message = Curve::embed(b"threshold message", &mut rng).unwrap();
        let cipher = ElGamalCiphertext::encrypt(message, Fr::rand(&mut rng), public_key);

        let pub_shares: Vec<(usize, Curve)> = [0usize, 1]
            .iter()
            .map(|&i| (i, decryption_share(shares[i], &cipher)))
            .collect();
        let secret = recover_secret_point(&pub_shares).unwrap();
        let recovered = cipher.c - secret;
        // Two of three shares interpolate to a different polynomial value.
        assert!(recovered.extract().is_err() || recovered.extract().unwrap() != b"threshold message");
    }
}
