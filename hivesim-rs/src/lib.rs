#![warn(clippy::unwrap_used)]
mod error;
mod macros;
mod simulation;
mod testapi;
mod testmatch;
#[cfg(feature = "testing")]
pub mod testing;
mod transport;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use simulation::{Simulation, HIVE_SIMULATOR, HIVE_TEST_PATTERN};
pub use testapi::{
    run_suite, run_test, AsyncNClientsTestFunc, AsyncTestFunc, Client, NClientTestSpec, Suite,
    Test, TestRun, TestSpec, Testable, CLIENT_RPC_PORT,
};
pub use testmatch::TestMatcher;
