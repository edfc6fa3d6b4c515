use std::time::Duration;

use crate::devnet::Role;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Hive(#[from] hivesim::Error),

    #[error("rpc call failed: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    #[error("unexpected {method} response: {value}")]
    InvalidResponse { method: &'static str, value: String },

    #[error("invalid enode {enode:?}: {reason}")]
    InvalidEnode { enode: String, reason: &'static str },

    #[error("{role} node {index} does not exist")]
    MissingNode { role: Role, index: usize },

    #[error("{role} node {index} is not reachable: {reason}")]
    Unreachable {
        role: Role,
        index: usize,
        reason: String,
    },

    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    #[error("nodes diverged: {0}")]
    Inconsistent(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
