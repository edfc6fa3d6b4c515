use std::path::PathBuf;

use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the simulation API client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("request to hive failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Hive answered with a status outside of 2xx.
    #[error("request failed ({status}): {body}")]
    Protocol { status: StatusCode, body: String },

    /// The response body did not have the expected shape.
    #[error("failed to decode {what} from response: {body:?}")]
    Decode { what: &'static str, body: String },

    /// The container was created but no address came back. The container id is
    /// kept so the caller can still kill it.
    #[error("no ip address returned: {container}")]
    NoIpAddress { container: String },

    #[error("refusing to use unset {0} id")]
    InvalidId(&'static str),

    #[error("invalid node parameters: {0}")]
    InvalidParameters(String),

    #[error("failed to read init file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode test result: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Config(String),

    #[error("failed to build rpc client: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    #[error("invalid test pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    /// Container id of a node that exists on the hive side even though the
    /// call that created it failed.
    pub fn orphaned_container(&self) -> Option<&str> {
        match self {
            Error::NoIpAddress { container } => Some(container),
            _ => None,
        }
    }
}
