//! Connection configuration.
//!
//! [`MySqlConfig`] carries every option the driver understands; the
//! capability flags requested during the handshake are derived from it with
//! [`MySqlConfig::capability_flags`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::{capabilities, charset};

/// SSL negotiation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Never use SSL
    #[default]
    Disable,
    /// Use SSL when the server advertises it, fall back to clear otherwise
    Preferred,
    /// Require SSL, fail if the server cannot do it
    Required,
    /// Require SSL and verify the server certificate chain
    VerifyCa,
    /// Require SSL and verify the chain plus the server hostname
    VerifyIdentity,
}

impl SslMode {
    /// Should the driver attempt the SSL upgrade at all?
    pub const fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Is SSL mandatory?
    pub const fn is_required(self) -> bool {
        matches!(
            self,
            SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity
        )
    }
}

/// TLS material and policy for the SSL upgrade.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// CA certificate bundle (PEM)
    pub ca: Option<PathBuf>,
    /// Directory of CA certificates (PEM files)
    pub capath: Option<PathBuf>,
    /// Client certificate for mutual TLS (PEM)
    pub cert: Option<PathBuf>,
    /// Private key for the client certificate (PEM)
    pub key: Option<PathBuf>,
    /// Restrict the cipher suites to these names
    pub cipher: Option<Vec<String>>,
    /// Skip server certificate verification. Testing only.
    pub danger_skip_verify: bool,
}

impl TlsConfig {
    /// True when no TLS material has been configured.
    pub fn is_empty(&self) -> bool {
        self.ca.is_none()
            && self.capath.is_none()
            && self.cert.is_none()
            && self.key.is_none()
            && self.cipher.is_none()
            && !self.danger_skip_verify
    }
}

/// Connection options.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    /// TCP port (default 3306)
    pub port: u16,
    /// Path to a Unix domain socket. When set, takes precedence over
    /// host/port. Unix only.
    pub unix_socket: Option<PathBuf>,
    /// Username
    pub user: String,
    /// Password
    pub password: Option<String>,
    /// Default database selected at connect time
    pub database: Option<String>,
    /// Character set id sent in the handshake (default utf8mb4)
    pub charset: u8,
    /// Connect timeout, also installed as the socket read/write timeout
    pub connect_timeout: Duration,
    /// SSL negotiation mode
    pub ssl_mode: SslMode,
    /// TLS material for the SSL upgrade
    pub tls: TlsConfig,
    /// Request the compressed protocol
    pub compression: bool,
    /// Statement executed (and drained) right after authentication
    pub init_command: Option<String>,
    /// Extra client capability flags OR-ed into the derived set
    pub client_flags: u32,
    /// Allow the server to request LOCAL INFILE transfers
    pub local_infile: bool,
    /// Reconnect transparently when a ping fails
    pub reconnect: bool,
    /// Connection attributes sent when the server supports them
    pub attributes: HashMap<String, String>,
    /// Max packet size announced to the server (default 64MB)
    pub max_packet_size: u32,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            unix_socket: None,
            user: String::new(),
            password: None,
            database: None,
            charset: charset::DEFAULT_CHARSET,
            connect_timeout: Duration::from_secs(30),
            ssl_mode: SslMode::default(),
            tls: TlsConfig::default(),
            compression: false,
            init_command: None,
            client_flags: 0,
            local_infile: false,
            reconnect: false,
            attributes: HashMap::new(),
            max_packet_size: 64 * 1024 * 1024,
        }
    }
}

impl MySqlConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hostname.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect through a Unix domain socket instead of TCP.
    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the default database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the character set id.
    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the SSL mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the TLS material.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Request the compressed protocol.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Run a statement right after authentication.
    pub fn init_command(mut self, sql: impl Into<String>) -> Self {
        self.init_command = Some(sql.into());
        self
    }

    /// OR extra client capability flags into the handshake.
    pub fn client_flags(mut self, flags: u32) -> Self {
        self.client_flags |= flags;
        self
    }

    /// Allow LOCAL INFILE requests.
    pub fn local_infile(mut self, enabled: bool) -> Self {
        self.local_infile = enabled;
        self
    }

    /// Reconnect transparently when a ping fails.
    ///
    /// A ping-triggered reconnect implicitly rolls back any open
    /// transaction; enable with care.
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    /// Add a connection attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the announced max packet size.
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// The `host:port` address string used for TCP connections.
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Derive the capability flags to request during the handshake.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capabilities::BASE_CLIENT_FLAGS | self.client_flags;

        if self.database.is_some() {
            flags |= capabilities::CLIENT_CONNECT_WITH_DB;
        }
        if self.ssl_mode.should_try_ssl() {
            flags |= capabilities::CLIENT_SSL;
        }
        if self.compression {
            flags |= capabilities::CLIENT_COMPRESS;
        }
        if self.local_infile {
            flags |= capabilities::CLIENT_LOCAL_FILES;
        }
        if !self.attributes.is_empty() {
            flags |= capabilities::CLIENT_CONNECT_ATTRS;
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains() {
        let config = MySqlConfig::new()
            .host("db.internal")
            .port(3307)
            .user("app")
            .password("secret")
            .database("orders")
            .connect_timeout(Duration::from_secs(5))
            .ssl_mode(SslMode::Required)
            .init_command("SET time_zone = '+00:00'")
            .reconnect(true)
            .attribute("program_name", "mysqlc");

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 3307);
        assert_eq!(config.user, "app");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.database.as_deref(), Some("orders"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.ssl_mode, SslMode::Required);
        assert_eq!(config.init_command.as_deref(), Some("SET time_zone = '+00:00'"));
        assert!(config.reconnect);
        assert_eq!(config.tcp_addr(), "db.internal:3307");
    }

    #[test]
    fn ssl_mode_predicates() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(SslMode::Preferred.should_try_ssl());
        assert!(!SslMode::Preferred.is_required());
        assert!(SslMode::Required.is_required());
        assert!(SslMode::VerifyCa.is_required());
        assert!(SslMode::VerifyIdentity.is_required());
    }

    #[test]
    fn capability_flags_follow_options() {
        let flags = MySqlConfig::new()
            .database("d")
            .compression(true)
            .local_infile(true)
            .attribute("k", "v")
            .ssl_mode(SslMode::Preferred)
            .capability_flags();

        assert_ne!(flags & capabilities::CLIENT_CONNECT_WITH_DB, 0);
        assert_ne!(flags & capabilities::CLIENT_COMPRESS, 0);
        assert_ne!(flags & capabilities::CLIENT_LOCAL_FILES, 0);
        assert_ne!(flags & capabilities::CLIENT_CONNECT_ATTRS, 0);
        assert_ne!(flags & capabilities::CLIENT_SSL, 0);
        assert_ne!(flags & capabilities::CLIENT_PROTOCOL_41, 0);

        let bare = MySqlConfig::new().capability_flags();
        assert_eq!(bare & capabilities::CLIENT_CONNECT_WITH_DB, 0);
        assert_eq!(bare & capabilities::CLIENT_SSL, 0);
    }

    #[test]
    fn extra_client_flags_are_kept() {
        let flags = MySqlConfig::new()
            .client_flags(capabilities::CLIENT_MULTI_STATEMENTS)
            .capability_flags();
        assert_ne!(flags & capabilities::CLIENT_MULTI_STATEMENTS, 0);
    }
}
