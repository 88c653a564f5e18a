use thiserror::Error;

/// Failure of one contract command. The ordering layer records the message
/// verbatim as the transaction's rejection reason; the contract never retries.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The caller failed the access check or is not permitted to run the
    /// command on this form.
    #[error("{0}")]
    NotAuthorized(String),
    /// Missing or undecodable transaction argument.
    #[error("{0}")]
    MalformedArgument(String),
    /// No form stored under the addressed id.
    #[error("{0}")]
    NotFound(String),
    /// The form is not in the status the command requires.
    #[error("{0}")]
    WrongStatus(String),
    /// A signature, random vector, shuffle proof, or embedded plaintext
    /// failed verification. Fatal for the transaction, never retried.
    #[error("{0}")]
    CryptoVerifyFailed(String),
    /// A key, index, or round that may be used at most once was reused.
    #[error("{0}")]
    DuplicateSubmission(String),
    /// A structural precondition is not met.
    #[error("{0}")]
    PreconditionUnmet(String),
    /// Snapshot access or canonical-codec failure. Indicates replica
    /// corruption; the replica should halt.
    #[error("{0}")]
    StorageFailure(String),
}
