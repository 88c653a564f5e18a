use ark_ff::PrimeField;
use sha2::{Digest, Sha256};

/// Deterministic byte stream obtained by hashing `seed ‖ counter` with
/// SHA-256. Every replica derives identical bytes from the same seed, which
/// makes the challenge vectors checked by the contract reproducible.
pub struct SemiRandomStream {
    seed: Vec<u8>,
    counter: u64,
    block: [u8; 32],
    offset: usize,
}

impl SemiRandomStream {
    pub fn new(seed: &[u8]) -> Self {
        let mut stream = Self {
            seed: seed.to_vec(),
            counter: 0,
            block: [0u8; 32],
            offset: 0,
        };
        stream.refill();
        stream
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(&self.seed);
        hasher.update(self.counter.to_be_bytes());
        self.block = hasher.finalize().into();
        self.counter += 1;
        self.offset = 0;
    }

    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut written = 0;
        while written < dest.len() {
            if self.offset == self.block.len() {
                self.refill();
            }
            let take = (dest.len() - written).min(self.block.len() - self.offset);
            dest[written..written + take]
                .copy_from_slice(&self.block[self.offset..self.offset + take]);
            self.offset += take;
            written += take;
        }
    }

    /// Draws a scalar, reduced modulo the field order. 64 bytes of stream
    /// input keep the reduction bias negligible.
    pub fn pick_scalar<F: PrimeField>(&mut self) -> F {
        let mut wide = [0u8; 64];
        self.fill_bytes(&mut wide);
        F::from_le_bytes_mod_order(&wide)
    }
}

/// Derives the `count`-element challenge vector seeded by a fingerprint.
pub fn derive_scalars<F: PrimeField>(seed: &[u8], count: usize) -> Vec<F> {
    let mut stream = SemiRandomStream::new(seed);
    (0..count).map(|_| stream.pick_scalar()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ed25519::Fr;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SemiRandomStream::new(b"seed");
        let mut b = SemiRandomStream::new(b"seed");

        let mut buf_a = [0u8; 100];
        let mut buf_b = [0u8; 100];
        a.fill_bytes(&mut buf_a);
        b.fill_bytes(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SemiRandomStream::new(b"seed-a");
        let mut b = SemiRandomStream::new(b"seed-b");

        let mut buf_a = [0u8; 32];
        let mut buf_b = [0u8; 32];
        a.fill_bytes(&mut buf_a);
        b.fill_bytes(&mut buf_b);
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn derive_scalars_is_pure() {
        let first: Vec<Fr> = derive_scalars(b"fingerprint", 4);
        let second: Vec<Fr> = derive_scalars(b"fingerprint", 4);
        assert_eq!(first, second);

        let other: Vec<Fr> = derive_scalars(b"other", 4);
        assert_ne!(first, other);
    }

    #[test]
    fn scalars_within_vector_differ() {
        let scalars: Vec<Fr> = derive_scalars(b"fingerprint", 8);
        for i in 0..scalars.len() {
            for j in i + 1..scalars.len() {
                assert_ne!(scalars[i], scalars[j]);
            }
        }
    }
}
