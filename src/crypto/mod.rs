pub mod bls;
pub mod elgamal;
pub mod lagrange;
pub mod shuffle;
pub mod stream;

use thiserror::Error;

pub use elgamal::{ElGamalCiphertext, ElGamalKeys, PointEmbedding};
pub use stream::SemiRandomStream;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("message too long: {len} > {max}")]
    MessageTooLong { len: usize, max: usize },
    #[error("failed to embed message into a curve point")]
    EmbeddingFailed,
    #[error("point does not carry an embedded message")]
    InvalidEmbedding,
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("bls verify failed: invalid signature")]
    InvalidSignature,
    #[error("shuffle proof rejected: {0}")]
    ShuffleRejected(&'static str),
    #[error("not enough shares: {got} < {needed}")]
    NotEnoughShares { got: usize, needed: usize },
    #[error("duplicate share index {0}")]
    DuplicateShareIndex(usize),
}
