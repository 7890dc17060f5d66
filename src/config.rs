//! CLI and configuration surface: argument parsing plus the
//! connection-string parser used to join an existing table.

use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingMode {
    /// Host reachable only on the local network.
    Lan,
    /// Host reachable externally (port forward / public address already
    /// configured by the operator — this crate never touches UPnP or NAT
    /// traversal setup itself).
    External,
    /// Host behind a third-party tunnel (e.g. a reverse proxy URL).
    LocalTunnel,
}

#[derive(Parser, Debug)]
#[command(name = "runic-sync", version, about = "Peer-to-peer virtual tabletop sync core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host a new table, acting as signaling router and GM.
    Create {
        /// Table password every joining peer must present.
        #[arg(long)]
        password: String,
        /// Port the signaling router listens on.
        #[arg(long, default_value_t = 7777)]
        port: u16,
        #[arg(long, value_enum, default_value = "lan")]
        mode: HostingModeArg,
        /// Display name to use on this table.
        #[arg(long)]
        name: Option<String>,
    },
    /// Join an existing table as a player.
    Join {
        /// One of the three accepted connection-string shapes (see
        /// `ConnectionString::parse`).
        connection: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingModeArg {
    Lan,
    External,
    LocalTunnel,
}

impl From<HostingModeArg> for HostingMode {
    fn from(v: HostingModeArg) -> Self {
        match v {
            HostingModeArg::Lan => HostingMode::Lan,
            HostingModeArg::External => HostingMode::External,
            HostingModeArg::LocalTunnel => HostingMode::LocalTunnel,
        }
    }
}

/// A parsed join target: host, optional port/path, and the table password
/// carried inline as the entire query string (not a `key=value` pair). Three
/// shapes are accepted:
///   - `https://<subdomain>.<tunnel-host>?<password>` (tunnel host, no port)
///   - `wss://<host>[:port][/path]?<password>`
///   - `runic:<host>:<port>?<password>` (bare scheme, port mandatory)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host: String,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub password: String,
    pub secure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStringError {
    UnrecognizedScheme,
    MissingHost,
    MissingPort,
    InvalidPort,
    MissingPassword,
}

impl std::fmt::Display for ConnectionStringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStringError::UnrecognizedScheme => write!(f, "unrecognized connection scheme"),
            ConnectionStringError::MissingHost => write!(f, "missing host"),
            ConnectionStringError::MissingPort => write!(f, "missing port"),
            ConnectionStringError::InvalidPort => write!(f, "invalid port"),
            ConnectionStringError::MissingPassword => write!(f, "missing password"),
        }
    }
}

impl std::error::Error for ConnectionStringError {}

impl ConnectionString {
    pub fn parse(input: &str) -> Result<Self, ConnectionStringError> {
        if let Some(rest) = input.strip_prefix("https://") {
            let (authority, password) = split_password(rest)?;
            let host = authority.trim_end_matches('/');
            if host.is_empty() {
                return Err(ConnectionStringError::MissingHost);
            }
            if host.contains(':') || host.contains('/') {
                return Err(ConnectionStringError::UnrecognizedScheme);
            }
            return Ok(ConnectionString {
                host: host.to_string(),
                port: None,
                path: None,
                password,
                secure: true,
            });
        }

        if let Some(rest) = input.strip_prefix("wss://") {
            let (authority, password) = split_password(rest)?;
            let (authority, path) = match authority.split_once('/') {
                Some((a, p)) => (a, Some(format!("/{p}"))),
                None => (authority, None),
            };
            let (host, port) = match authority.split_once(':') {
                Some((h, p)) => (h, Some(p.parse::<u16>().map_err(|_| ConnectionStringError::InvalidPort)?)),
                None => (authority, None),
            };
            if host.is_empty() {
                return Err(ConnectionStringError::MissingHost);
            }
            return Ok(ConnectionString {
                host: host.to_string(),
                port,
                path,
                password,
                secure: true,
            });
        }

        if let Some(rest) = input.strip_prefix("runic:") {
            let (authority, password) = split_password(rest)?;
            let (host, port_str) = authority.split_once(':').ok_or(ConnectionStringError::MissingPort)?;
            if host.is_empty() {
                return Err(ConnectionStringError::MissingHost);
            }
            let port: u16 = port_str.parse().map_err(|_| ConnectionStringError::InvalidPort)?;
            return Ok(ConnectionString {
                host: host.to_string(),
                port: Some(port),
                path: None,
                password,
                secure: false,
            });
        }

        Err(ConnectionStringError::UnrecognizedScheme)
    }
}

/// Split `rest` (everything after the scheme) on its first `?`. Unlike a
/// typical URL, everything after that `?` is the password verbatim — there's
/// no `password=` key to strip.
fn split_password(rest: &str) -> Result<(&str, String), ConnectionStringError> {
    let (authority, password) = rest.split_once('?').ok_or(ConnectionStringError::MissingPassword)?;
    if password.is_empty() {
        return Err(ConnectionStringError::MissingPassword);
    }
    Ok((authority, password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_tunnel_connection_string() {
        let cs = ConnectionString::parse("https://abc.tunnel.example?hunter2").unwrap();
        assert_eq!(cs.host, "abc.tunnel.example");
        assert_eq!(cs.port, None);
        assert_eq!(cs.path, None);
        assert_eq!(cs.password, "hunter2");
        assert!(cs.secure);
    }

    #[test]
    fn parses_wss_connection_string_with_port_and_path() {
        let cs = ConnectionString::parse("wss://192.168.1.5:7777/join?abc").unwrap();
        assert_eq!(cs.host, "192.168.1.5");
        assert_eq!(cs.port, Some(7777));
        assert_eq!(cs.path.as_deref(), Some("/join"));
        assert_eq!(cs.password, "abc");
        assert!(cs.secure);
    }

    #[test]
    fn parses_wss_connection_string_without_port() {
        let cs = ConnectionString::parse("wss://table.example.com?abc").unwrap();
        assert_eq!(cs.host, "table.example.com");
        assert_eq!(cs.port, None);
        assert!(cs.secure);
    }

    #[test]
    fn parses_bare_runic_scheme() {
        let cs = ConnectionString::parse("runic:192.168.1.5:7777?abc").unwrap();
        assert_eq!(cs.host, "192.168.1.5");
        assert_eq!(cs.port, Some(7777));
        assert!(!cs.secure);
    }

    #[test]
    fn runic_scheme_requires_a_port() {
        assert_eq!(
            ConnectionString::parse("runic:host?abc"),
            Err(ConnectionStringError::MissingPort)
        );
    }

    #[test]
    fn missing_password_is_an_error() {
        assert_eq!(
            ConnectionString::parse("runic:host:7777"),
            Err(ConnectionStringError::MissingPassword)
        );
    }

    #[test]
    fn unrecognized_scheme_is_an_error() {
        assert_eq!(
            ConnectionString::parse("ftp://host:21?x"),
            Err(ConnectionStringError::UnrecognizedScheme)
        );
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert_eq!(
            ConnectionString::parse("runic:host:notaport?x"),
            Err(ConnectionStringError::InvalidPort)
        );
    }
}
