//! Connection configuration types.

use std::time::Duration;

/// IMAP connection configuration.
///
/// Connection and authentication carry independent timeouts because they
/// fail for different reasons (unreachable host vs. slow or rejecting
/// auth backend) and callers report them differently.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port (implicit TLS, conventionally 993).
    pub port: u16,
    /// TCP + TLS establishment timeout.
    pub connect_timeout: Duration,
    /// Greeting + LOGIN timeout.
    pub auth_timeout: Duration,
    /// Per-round-trip timeout for ordinary commands.
    pub io_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 993,
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    auth_timeout: Duration,
    io_timeout: Duration,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 993,
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the authentication timeout.
    #[must_use]
    pub const fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Sets the per-command I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            connect_timeout: self.connect_timeout,
            auth_timeout: self.auth_timeout,
            io_timeout: self.io_timeout,
        }
    }
}

/// Mailbox login credentials.
#[derive(Clone)]
pub struct Credentials {
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.auth_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("imap.example.com")
            .port(1993)
            .connect_timeout(Duration::from_secs(5))
            .auth_timeout(Duration::from_secs(7))
            .io_timeout(Duration::from_secs(60))
            .build();

        assert_eq!(config.port, 1993);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.auth_timeout, Duration::from_secs(7));
        assert_eq!(config.io_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "office@property.example".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("office@property.example"));
    }
}
