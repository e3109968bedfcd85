//! `bw` CLI client implementation

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::BwCliConfig;
use crate::error::CliError;

/// Environment variable carrying the session key to `bw` commands
pub const SESSION_ENV: &str = "BW_SESSION";

/// Environment variable read by `bw unlock --passwordenv`
pub const PASSWORD_ENV: &str = "BW_PASSWORD";

const NO_INTERACTION_ENV: &str = "BW_NOINTERACTION";

/// Printed by `bw config server` when a session is already logged in
const LOGOUT_REQUIRED: &str = "Logout required before server config update";

/// Output of a successful `bw` command
#[derive(Debug, Clone, Default)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    /// stdout followed by stderr
    pub combined: String,
}

/// Client that shells out to the `bw` binary.
///
/// Secrets are handed to each child through its own environment only, never
/// through the argument list and never through the parent's environment.
#[derive(Debug, Clone)]
pub struct BwCli {
    config: BwCliConfig,
}

impl BwCli {
    pub fn new(config: BwCliConfig) -> Self {
        Self { config }
    }

    pub fn binary(&self) -> &str {
        &self.config.binary
    }

    /// Run a `bw` command and capture its output.
    async fn run(
        &self,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<CommandOutput, CliError> {
        debug!(command = %args.join(" "), "Running bw command");

        let child = Command::new(&self.config.binary)
            .args(args)
            .envs(envs.iter().copied())
            .env(NO_INTERACTION_ENV, "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CliError::Spawn {
                binary: self.config.binary.clone(),
                message: e.to_string(),
            })?;

        // On timeout the child is dropped and killed via `kill_on_drop(true)`.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CliError::Timeout(timeout))?
            .map_err(|e| CliError::Spawn {
                binary: self.config.binary.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}{}", stdout, stderr).trim().to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, combined })
        } else {
            Err(CliError::Failed {
                status: output.status.to_string(),
                output: combined,
            })
        }
    }

    /// Point the CLI at a self-hosted server (`bw config server <host>`)
    ///
    /// `bw` refuses to change the server while logged in. That only happens
    /// when the CLI data directory survived a restart, in which case the
    /// server was already configured before the earlier login.
    pub async fn configure_server(&self, host: &str) -> Result<(), CliError> {
        info!(host = %host, "Configuring bw-cli to use the supplied host");
        match self
            .run(&["config", "server", host], &[], self.config.command_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(CliError::Failed { output, .. }) if output.contains(LOGOUT_REQUIRED) => {
                info!("bw-cli is already logged in, keeping the configured server");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Log in non-interactively with the API key (`bw login --apikey`)
    ///
    /// A CLI that is already logged in counts as success, so restarts against
    /// a persisted CLI data directory do not fail.
    pub async fn login_apikey(&self) -> Result<(), CliError> {
        let envs = [
            ("BW_CLIENTID", self.config.client_id.expose_secret().as_str()),
            ("BW_CLIENTSECRET", self.config.client_secret.expose_secret().as_str()),
        ];

        match self
            .run(&["login", "--apikey"], &envs, self.config.command_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(CliError::Failed { output, .. }) if output.contains("You are already logged in") => {
                info!("bw-cli is already logged in");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Unlock the vault and return the raw session key
    /// (`bw unlock --passwordenv BW_PASSWORD --raw`)
    pub async fn unlock(&self) -> Result<Secret<String>, CliError> {
        let envs = [(PASSWORD_ENV, self.config.password.expose_secret().as_str())];
        let output = self
            .run(
                &["unlock", "--passwordenv", PASSWORD_ENV, "--raw"],
                &envs,
                self.config.command_timeout,
            )
            .await?;

        let session = output.stdout.trim();
        if session.is_empty() {
            return Err(CliError::EmptyOutput);
        }
        Ok(Secret::new(session.to_string()))
    }

    /// Check that the session key unlocks the vault (`bw unlock --check`)
    pub async fn check_unlocked(&self, session: &Secret<String>) -> Result<(), CliError> {
        let envs = [(SESSION_ENV, session.expose_secret().as_str())];
        self.run(&["unlock", "--check"], &envs, self.config.command_timeout)
            .await?;
        Ok(())
    }

    /// Pull the latest vault data (`bw sync`), returning the combined output
    pub async fn sync(&self, session: &Secret<String>) -> Result<String, CliError> {
        let envs = [(SESSION_ENV, session.expose_secret().as_str())];
        let output = self
            .run(&["sync"], &envs, self.config.sync_timeout)
            .await?;
        Ok(output.combined)
    }

    /// `bw serve` command with the session key in the child's environment
    /// and inherited stdio, suitable for replacing the current process image.
    pub fn serve_std_command(
        &self,
        session: &Secret<String>,
        hostname: &str,
        port: u16,
    ) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.config.binary);
        cmd.args(["serve", "--hostname", hostname, "--port"])
            .arg(port.to_string())
            .env(SESSION_ENV, session.expose_secret())
            .env(NO_INTERACTION_ENV, "true");
        cmd
    }

    /// `bw serve` command for running as a supervised child with piped stdio
    pub fn serve_command(&self, session: &Secret<String>, hostname: &str, port: u16) -> Command {
        let mut cmd = Command::from(self.serve_std_command(session, hostname, port));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Vault CLI operations used by setup and sync
#[async_trait]
pub trait VaultCli: Send + Sync {
    /// Configure a custom server
    async fn configure_server(&self, host: &str) -> Result<(), CliError>;

    /// Log in with API key credentials
    async fn login_apikey(&self) -> Result<(), CliError>;

    /// Unlock and obtain a session key
    async fn unlock(&self) -> Result<Secret<String>, CliError>;

    /// Verify a session key
    async fn check_unlocked(&self, session: &Secret<String>) -> Result<(), CliError>;

    /// Sync the vault
    async fn sync(&self, session: &Secret<String>) -> Result<String, CliError>;
}

#[async_trait]
impl VaultCli for BwCli {
    async fn configure_server(&self, host: &str) -> Result<(), CliError> {
        self.configure_server(host).await
    }

    async fn login_apikey(&self) -> Result<(), CliError> {
        self.login_apikey().await
    }

    async fn unlock(&self) -> Result<Secret<String>, CliError> {
        self.unlock().await
    }

    async fn check_unlocked(&self, session: &Secret<String>) -> Result<(), CliError> {
        self.check_unlocked(session).await
    }

    async fn sync(&self, session: &Secret<String>) -> Result<String, CliError> {
        self.sync(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BwCliConfigBuilder;

    #[test]
    fn test_serve_command_line() {
        let cli = BwCli::new(BwCliConfigBuilder::new("bw").build());
        let session = Secret::new("session-token".to_string());
        let cmd = cli.serve_std_command(&session, "127.0.0.1", 8088);

        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["serve", "--hostname", "127.0.0.1", "--port", "8088"]);
        assert!(!args.iter().any(|a| a.contains("session-token")));

        let session_env = cmd
            .get_envs()
            .find(|(key, _)| *key == SESSION_ENV)
            .and_then(|(_, value)| value)
            .map(|v| v.to_string_lossy().into_owned());
        assert_eq!(session_env.as_deref(), Some("session-token"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = BwCli::new(BwCliConfigBuilder::new("/nonexistent/bw-binary").build());
        let result = cli.configure_server("https://vault.example.com").await;
        assert!(matches!(result, Err(CliError::Spawn { .. })));
    }
}
