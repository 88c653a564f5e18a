pub mod codec;
pub mod contract;
pub mod crypto;
pub mod crypto_serde;
pub mod forms;
pub mod logging;
pub mod orchestrator;
pub mod ordering;

#[cfg(test)]
pub mod test_support;

pub use contract::{Command, ContractError, FormContract};
pub use crypto::{CryptoError, ElGamalCiphertext, PointEmbedding};
pub use forms::{Ballot, Configuration, Form, FormId, FormStatus};
pub use orchestrator::{OrchestratorError, ShuffleOrchestrator};
