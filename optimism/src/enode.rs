use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn enode_regex() -> &'static Regex {
    static ENODE: OnceLock<Regex> = OnceLock::new();
    ENODE.get_or_init(|| {
        Regex::new(r"^enode://([0-9a-fA-F]{128})@([^:?/]+|\[[0-9a-fA-F:.]+\]):(\d+)(?:\?discport=(\d+))?$")
            .unwrap_or_else(|_| unreachable!("enode pattern is valid"))
    })
}

/// A devp2p node URL: `enode://<pubkey>@<ip>:<tcp port>[?discport=<udp port>]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enode {
    /// Hex encoded uncompressed secp256k1 key, without the 04 prefix.
    pub id: String,
    pub ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl Enode {
    pub fn parse(enode: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidEnode {
            enode: enode.to_string(),
            reason,
        };
        let caps = enode_regex()
            .captures(enode)
            .ok_or_else(|| invalid("not an enode url"))?;

        let host = caps[2].trim_start_matches('[').trim_end_matches(']');
        let ip = IpAddr::from_str(host).map_err(|_| invalid("host is not an ip address"))?;
        let tcp_port = caps[3]
            .parse::<u16>()
            .map_err(|_| invalid("invalid tcp port"))?;
        let udp_port = match caps.get(4) {
            Some(port) => port
                .as_str()
                .parse::<u16>()
                .map_err(|_| invalid("invalid discovery port"))?,
            None => tcp_port,
        };

        Ok(Self {
            id: caps[1].to_lowercase(),
            ip,
            tcp_port,
            udp_port,
        })
    }
}

impl FromStr for Enode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Enode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = match self.ip {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{ip}]"),
        };
        write!(f, "enode://{}@{}:{}", self.id, host, self.tcp_port)?;
        if self.udp_port != self.tcp_port {
            write!(f, "?discport={}", self.udp_port)?;
        }
        Ok(())
    }
}
