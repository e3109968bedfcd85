//! adapter-bitwarden - Bitwarden CLI adapter
//!
//! Provides async access to the `bw` command line client:
//! - Server configuration, API key login and unlock
//! - Session verification and vault sync
//! - `bw serve` command construction
//! - Health probing of a running `bw serve`

pub mod client;
pub mod config;
pub mod error;
pub mod health;

pub use client::{BwCli, VaultCli, PASSWORD_ENV, SESSION_ENV};
pub use config::{BwCliConfig, BwCliConfigBuilder};
pub use error::{CliError, ProbeError};
pub use health::{BackendProbe, BackendStatus, HttpStatusProbe};
