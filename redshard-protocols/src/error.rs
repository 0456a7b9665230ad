use thiserror::Error;

/// Errors produced while decoding cluster protocol payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed node address '{0}'")]
    Address(String),

    #[error("malformed redirect '{0}'")]
    Redirect(String),

    #[error("unexpected CLUSTER SLOTS reply: {0}")]
    Slots(String),

    #[error("malformed CLUSTER NODES line '{0}'")]
    Nodes(String),
}
