//! Bitwarden CLI configuration

use std::time::Duration;

use secrecy::Secret;

/// Configuration for [`BwCli`](crate::BwCli)
#[derive(Debug, Clone)]
pub struct BwCliConfig {
    /// Path or name of the `bw` executable
    pub binary: String,

    /// API key client id, passed to `bw login --apikey` as `BW_CLIENTID`
    pub client_id: Secret<String>,

    /// API key client secret, passed as `BW_CLIENTSECRET`
    pub client_secret: Secret<String>,

    /// Master password, passed to `bw unlock --passwordenv` as `BW_PASSWORD`
    pub password: Secret<String>,

    /// Timeout for config/login/unlock/check commands
    pub command_timeout: Duration,

    /// Timeout for `bw sync`
    pub sync_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_sync_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for BwCliConfig {
    fn default() -> Self {
        Self {
            binary: "bw".to_string(),
            client_id: Secret::new(String::new()),
            client_secret: Secret::new(String::new()),
            password: Secret::new(String::new()),
            command_timeout: default_command_timeout(),
            sync_timeout: default_sync_timeout(),
        }
    }
}

/// Builder for BwCliConfig
pub struct BwCliConfigBuilder {
    config: BwCliConfig,
}

impl BwCliConfigBuilder {
    /// Create a new builder for the given `bw` binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            config: BwCliConfig {
                binary: binary.into(),
                ..Default::default()
            },
        }
    }

    /// Set API key credentials
    pub fn with_api_key(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.client_id = Secret::new(client_id.into());
        self.config.client_secret = Secret::new(client_secret.into());
        self
    }

    /// Set API key credentials that are already wrapped
    pub fn with_api_key_secrets(mut self, client_id: Secret<String>, client_secret: Secret<String>) -> Self {
        self.config.client_id = client_id;
        self.config.client_secret = client_secret;
        self
    }

    /// Set the master password
    pub fn with_password(mut self, password: Secret<String>) -> Self {
        self.config.password = password;
        self
    }

    /// Set the timeout for setup commands
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the timeout for `bw sync`
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> BwCliConfig {
        self.config
    }
}
