use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameter naming the client type a node is started from.
pub const CLIENT_PARAMETER: &str = "CLIENT";

macro_rules! hive_id {
    ($name:ident, $what:literal) => {
        /// Server assigned identifier. Zero is never handed out by hive and
        /// marks an unset id.
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn is_valid(&self) -> bool {
                self.0 != 0
            }

            pub(crate) fn checked(self) -> Result<Self> {
                if self.is_valid() {
                    Ok(self)
                } else {
                    Err(Error::InvalidId($what))
                }
            }

            pub(crate) fn parse(body: &str) -> Result<Self> {
                let decode = || Error::Decode {
                    what: $what,
                    body: body.to_string(),
                };
                let id = body.trim().parse::<u32>().map_err(|_| decode())?;
                if id == 0 {
                    return Err(decode());
                }
                Ok(Self(id))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

hive_id!(SuiteID, "suite");
hive_id!(TestID, "test");

/// Structured reply of the node endpoints. Hive answers with this JSON document
/// when it supports it, older versions answer with `id@ip@extra`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StartNodeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub id: String, // Container ID.
    pub ip: String, // IP address in bridge network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl StartNodeResponse {
    pub const VERSION: u32 = 1;
}

/// A node started by hive. Only the container id is needed to tear it down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeHandle {
    pub container: String,
    pub ip: IpAddr,
    /// Whatever hive appends after the address, e.g. a MAC for pseudo clients.
    pub extra: Option<String>,
}

impl NodeHandle {
    /// Decodes the body returned by the node and pseudo endpoints.
    pub fn decode(body: &str) -> Result<Self> {
        let decode_err = || Error::Decode {
            what: "node handle",
            body: body.to_string(),
        };

        if body.trim_start().starts_with('{') {
            let resp: StartNodeResponse =
                serde_json::from_str(body).map_err(|_| decode_err())?;
            if resp.version.is_some_and(|v| v != StartNodeResponse::VERSION) || resp.id.is_empty()
            {
                return Err(decode_err());
            }
            let ip = IpAddr::from_str(&resp.ip).map_err(|_| decode_err())?;
            return Ok(Self {
                container: resp.id,
                ip,
                extra: resp.extra,
            });
        }

        let mut parts = body.splitn(3, '@');
        let container = parts.next().unwrap_or_default();
        if container.trim().is_empty() {
            return Err(decode_err());
        }
        let Some(ip) = parts.next() else {
            return Err(Error::NoIpAddress {
                container: body.to_string(),
            });
        };
        let ip = IpAddr::from_str(ip.trim()).map_err(|_| decode_err())?;

        Ok(Self {
            container: container.to_string(),
            ip,
            extra: parts.next().map(str::to_string),
        })
    }
}

/// Environment style parameters and init files for a new node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeParams {
    pub params: BTreeMap<String, String>,
    /// Upload name to local path.
    pub files: BTreeMap<String, PathBuf>,
}

impl NodeParams {
    pub fn new(client_type: impl Into<String>) -> Self {
        Self::default().param(CLIENT_PARAMETER, client_type)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn file(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.insert(key.into(), path.into());
        self
    }

    /// Applies `other` on top of `self`; entries of `other` win.
    pub fn merge(mut self, other: NodeParams) -> Self {
        self.params.extend(other.params);
        self.files.extend(other.files);
        self
    }

    pub fn client_type(&self) -> Option<&str> {
        self.params.get(CLIENT_PARAMETER).map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        match self.client_type() {
            Some(client) if !client.is_empty() => {}
            _ => {
                return Err(Error::InvalidParameters(format!(
                    "missing {CLIENT_PARAMETER} parameter"
                )))
            }
        }
        if let Some(key) = self.files.keys().find(|key| self.params.contains_key(*key)) {
            return Err(Error::InvalidParameters(format!(
                "{key} is used both as parameter and as file"
            )));
        }
        Ok(())
    }
}

impl From<BTreeMap<String, String>> for NodeParams {
    fn from(params: BTreeMap<String, String>) -> Self {
        Self {
            params,
            files: BTreeMap::new(),
        }
    }
}

// ClientMetadata is part of the ClientDefinition and lists metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub roles: Vec<String>,
}

// ClientDefinition is served by the /clients API endpoint to list the available clients.
// Older hive versions only send the client names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ClientDefinitionRepr")]
pub struct ClientDefinition {
    pub name: String,
    pub version: String,
    pub meta: ClientMetadata,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClientDefinitionRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        version: String,
        #[serde(default)]
        meta: ClientMetadata,
    },
}

impl From<ClientDefinitionRepr> for ClientDefinition {
    fn from(repr: ClientDefinitionRepr) -> Self {
        match repr {
            ClientDefinitionRepr::Name(name) => Self {
                name,
                version: String::new(),
                meta: ClientMetadata::default(),
            },
            ClientDefinitionRepr::Full {
                name,
                version,
                meta,
            } => Self {
                name,
                version,
                meta,
            },
        }
    }
}

/// Describes the outcome of a test.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub pass: bool,
    pub details: String,
}

impl TestResult {
    pub fn pass() -> Self {
        Self {
            pass: true,
            details: String::new(),
        }
    }

    pub fn fail(details: impl Into<String>) -> Self {
        Self {
            pass: false,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn decode_full_node_response() {
        let handle = NodeHandle::decode("abc123@172.17.0.4@02:42:ac:11:00:04").unwrap();
        assert_eq!(handle.container, "abc123");
        assert_eq!(handle.ip, IpAddr::V4(Ipv4Addr::new(172, 17, 0, 4)));
        assert_eq!(handle.extra.as_deref(), Some("02:42:ac:11:00:04"));
    }

    #[test]
    fn decode_keeps_separators_in_extra() {
        let handle = NodeHandle::decode("abc@10.0.0.1@x@y").unwrap();
        assert_eq!(handle.extra.as_deref(), Some("x@y"));
    }

    #[test]
    fn decode_without_extra() {
        let handle = NodeHandle::decode("abc@10.0.0.1").unwrap();
        assert_eq!(handle.extra, None);
    }

    #[test]
    fn decode_bare_id_keeps_container() {
        let err = NodeHandle::decode("deadbeef").unwrap_err();
        assert_eq!(err.orphaned_container(), Some("deadbeef"));
        assert!(err.to_string().contains("no ip address returned"));
    }

    #[test]
    fn decode_bad_ip() {
        let err = NodeHandle::decode("abc@not-an-ip@").unwrap_err();
        match err {
            Error::Decode { body, .. } => assert_eq!(body, "abc@not-an-ip@"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn decode_structured_response() {
        let handle =
            NodeHandle::decode(r#"{"version":1,"id":"abc","ip":"fd00::2","extra":"m"}"#).unwrap();
        assert_eq!(handle.container, "abc");
        assert!(handle.ip.is_ipv6());
        assert_eq!(handle.extra.as_deref(), Some("m"));

        assert!(matches!(
            NodeHandle::decode(r#"{"version":2,"id":"abc","ip":"10.0.0.1"}"#),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn parse_ids() {
        assert_eq!(SuiteID::parse("12\n").unwrap(), SuiteID(12));
        assert!(matches!(TestID::parse("x"), Err(Error::Decode { what: "test", .. })));
        assert!(TestID::parse("0").is_err());
        assert!(SuiteID::default().checked().is_err());
    }

    #[test]
    fn params_validation() {
        assert!(NodeParams::new("geth").validate().is_ok());
        assert!(NodeParams::default().param("HIVE_X", "1").validate().is_err());

        let clash = NodeParams::new("geth")
            .param("/genesis.json", "x")
            .file("/genesis.json", "/tmp/genesis.json");
        assert!(matches!(clash.validate(), Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn params_merge_overrides_win() {
        let merged = NodeParams::new("geth")
            .param("HIVE_NETWORK_ID", "1")
            .merge(NodeParams::default().param("HIVE_NETWORK_ID", "5"));
        assert_eq!(merged.params["HIVE_NETWORK_ID"], "5");
        assert_eq!(merged.client_type(), Some("geth"));
    }

    #[test]
    fn client_definitions_accept_both_shapes() {
        let defs: Vec<ClientDefinition> = serde_json::from_str(
            r#"["geth", {"name":"op-node","version":"v1","meta":{"roles":["op-node"]}}]"#,
        )
        .unwrap();
        assert_eq!(defs[0].name, "geth");
        assert!(defs[0].meta.roles.is_empty());
        assert_eq!(defs[1].meta.roles, vec!["op-node".to_string()]);
    }
}
