#![warn(clippy::unwrap_used)]
//! Building blocks for optimism simulators: typed handles for the nodes of a
//! devnet, RPC clients for their APIs, and a monitor that checks the nodes
//! stay in sync.

pub mod config;
pub mod devnet;
pub mod enode;
mod error;
pub mod monitor;
pub mod nodes;
pub mod rpc;

pub use config::DevnetConfig;
pub use devnet::{Devnet, Role};
pub use enode::Enode;
pub use error::{Error, Result};
pub use monitor::{ConsistencyMonitor, MonitorHandle, MonitorReport, StatusSource};
