use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_postgres::{Client, NoTls};

use crate::error::ConnectivityError;

const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Everything needed to reach the target database on behalf of one person.
///
/// Created at login and dropped at disconnect. The password is never
/// serialized, so a `Credentials` written to disk cannot leak it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Name recorded in the audit log; unrelated to the database role.
    pub app_user: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Use with caution.
    /// Ignored for `verify-ca` and `verify-full`.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional path to a custom CA bundle (PEM format).
    /// If not set, the system CA store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
}

/// SSL/TLS connection modes for PostgreSQL.
///
/// These match the standard PostgreSQL sslmode parameter:
/// - `Disable`: No SSL (unencrypted)
/// - `Prefer`: Try SSL first, fall back to non-SSL (default)
/// - `Require`: Require SSL but don't verify certificate
/// - `VerifyCa`: Require SSL and verify the server certificate is signed by a trusted CA
/// - `VerifyFull`: Like VerifyCa, but also verify the server hostname matches the certificate
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl Credentials {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.ssl_mode.as_str(),
            CONNECT_TIMEOUT_SECS
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            app_user: String::new(),
            host: String::from("localhost"),
            port: 5432,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_user", &self.app_user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

/// Open a fresh PostgreSQL client. The connection driver runs on its own
/// task and ends when the returned `Client` is dropped.
pub async fn create_client(creds: &Credentials) -> Result<Client, ConnectivityError> {
    let conn_string = creds.connection_string();
    let timeout = Duration::from_secs(CONNECT_TIMEOUT_SECS);

    let client = match creds.ssl_mode {
        SslMode::Disable => {
            let (client, connection) =
                tokio::time::timeout(timeout, tokio_postgres::connect(&conn_string, NoTls))
                    .await
                    .map_err(|_| ConnectivityError::Timeout(CONNECT_TIMEOUT_SECS))?
                    .map_err(|e| ConnectivityError::Connect(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "postgres connection error");
                }
            });
            client
        }
        SslMode::Prefer | SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            // verify-ca / verify-full always check the certificate chain
            let strict = matches!(creds.ssl_mode, SslMode::VerifyCa | SslMode::VerifyFull);
            let tls = build_tls_connector(creds, strict)?;
            let (client, connection) =
                tokio::time::timeout(timeout, tokio_postgres::connect(&conn_string, tls))
                    .await
                    .map_err(|_| ConnectivityError::Timeout(CONNECT_TIMEOUT_SECS))?
                    .map_err(|e| ConnectivityError::Connect(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "postgres connection error");
                }
            });
            client
        }
    };

    tracing::debug!(target_db = %creds.display_string(), "connected");
    Ok(client)
}

/// Build a TLS connector with appropriate certificate configuration.
///
/// # Arguments
/// * `creds` - Connection settings
/// * `strict_verify` - If true, always verify certificates (for verify-ca/verify-full modes)
fn build_tls_connector(
    creds: &Credentials,
    strict_verify: bool,
) -> Result<MakeTlsConnector, ConnectivityError> {
    let mut builder = native_tls::TlsConnector::builder();

    if creds.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &creds.ca_cert_path {
        let ca_data = std::fs::read(ca_path).map_err(|e| {
            ConnectivityError::Tls(format!("failed to read CA certificate file {ca_path}: {e}"))
        })?;
        for pem in split_pem_certificates(&ca_data)? {
            let cert = native_tls::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| ConnectivityError::Tls(format!("failed to parse certificate: {e}")))?;
            builder.add_root_certificate(cert);
        }
    }

    let connector = builder
        .build()
        .map_err(|e| ConnectivityError::Tls(format!("failed to build TLS connector: {e}")))?;

    Ok(MakeTlsConnector::new(connector))
}

/// Split a PEM bundle into one PEM document per certificate.
fn split_pem_certificates(pem_data: &[u8]) -> Result<Vec<String>, ConnectivityError> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|_| ConnectivityError::Tls("CA certificate file is not valid UTF-8".into()))?;

    let mut certs = Vec::new();
    let mut current = String::new();
    let mut in_cert = false;

    for line in pem_str.lines() {
        if line.contains("-----BEGIN CERTIFICATE-----") {
            in_cert = true;
            current.clear();
            current.push_str(line.trim());
            current.push('\n');
        } else if line.contains("-----END CERTIFICATE-----") {
            if in_cert {
                current.push_str(line.trim());
                current.push('\n');
                certs.push(std::mem::take(&mut current));
            }
            in_cert = false;
        } else if in_cert {
            current.push_str(line.trim());
            current.push('\n');
        }
    }

    if certs.is_empty() {
        return Err(ConnectivityError::Tls(
            "no valid certificates found in PEM data".into(),
        ));
    }

    Ok(certs)
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            app_user: "ada".into(),
            database: "shop".into(),
            username: "postgres".into(),
            password: "s3cr'et".into(),
            ..Credentials::default()
        }
    }

    #[test]
    fn test_connection_string_quotes_values() {
        let s = creds().connection_string();
        assert!(s.contains("host='localhost'"));
        assert!(s.contains("port=5432"));
        assert!(s.contains("dbname='shop'"));
        assert!(s.contains("password='s3cr\\'et'"));
        assert!(s.contains("sslmode=prefer"));
    }

    #[test]
    fn test_connection_string_uses_the_connect_timeout() {
        let s = creds().connection_string();
        assert!(s.ends_with(&format!("connect_timeout={CONNECT_TIMEOUT_SECS}")));
        assert_eq!(CONNECT_TIMEOUT_SECS, 15);
    }

    #[test]
    fn test_display_string() {
        assert_eq!(creds().display_string(), "postgres@localhost:5432/shop");
    }

    #[test]
    fn test_password_is_not_serialized() {
        let json = serde_json::to_string(&creds()).unwrap();
        assert!(!json.contains("s3cr"));
        let back: Credentials = serde_json::from_str(&json).unwrap();
        assert!(back.password.is_empty());
        assert_eq!(back.app_user, "ada");
    }

    #[test]
    fn test_debug_redacts_password() {
        let dbg = format!("{:?}", creds());
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("s3cr"));
    }

    #[test]
    fn test_ssl_mode_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: SslMode,
        }
        let w: Wrapper = toml::from_str("mode = \"verify-full\"").unwrap();
        assert_eq!(w.mode, SslMode::VerifyFull);
        assert_eq!(SslMode::VerifyCa.as_str(), "verify-ca");
    }

    #[test]
    fn test_split_pem_bundle() {
        let bundle = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n\
                      junk\n\
                      -----BEGIN CERTIFICATE-----\nBBBB\n-----END CERTIFICATE-----\n";
        let certs = split_pem_certificates(bundle.as_bytes()).unwrap();
        assert_eq!(certs.len(), 2);
        assert!(certs[0].contains("AAAA"));
        assert!(certs[1].starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(certs[1].trim_end().ends_with("-----END CERTIFICATE-----"));
    }

    #[test]
    fn test_split_pem_rejects_empty() {
        assert!(split_pem_certificates(b"not a cert").is_err());
    }
}
