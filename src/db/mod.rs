//! Database related things.

use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use rustls::{
    DigitallySignedStruct,
    Error as TlsError,
    SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    fs,
    path::{PathBuf, Path},
    sync::Arc,
};
use tokio_postgres::NoTls;

use crate::prelude::*;


pub(crate) mod cmd;
mod tx;
pub(crate) mod types;
pub(crate) mod util;

#[cfg(test)]
mod tests;

pub(crate) use self::tx::{DbError, Transaction};


#[derive(Debug, confique::Config)]
pub(crate) struct DbConfig {
    /// The username of the database user.
    #[config(default = "farmstand", env = "DB_USER")]
    user: String,

    /// The password of the database user. Can be omitted if the database
    /// server does not require one.
    #[config(env = "DB_PASSWORD")]
    password: Option<SecretString>,

    /// The host the database server is running on.
    #[config(default = "127.0.0.1", env = "DB_HOST")]
    pub(crate) host: String,

    /// The port the database server is listening on. (Just useful if your
    /// database server is not running on the default PostgreSQL port).
    #[config(default = 5432, env = "DB_PORT")]
    port: u16,

    /// The name of the database to use.
    #[config(default = "farmstand", env = "DB_NAME")]
    pub(crate) database: String,

    /// The TLS mode for the database connection.
    ///
    /// - "on": encryption is required and the server certificate is validated
    ///    against trusted certificates which are loaded from the system's
    ///    native certificate store. If `server_cert` is set, that's also
    ///    loaded and trusted.
    /// - "without-verify-cert": encryption is required, but the server
    ///   certificate is not checked. Allows MITM attacks!
    /// - "off": no encryption.
    #[config(default = "without-verify-cert", env = "DB_TLS_MODE")]
    tls_mode: TlsMode,

    /// Path to the server certificate. This makes sense if you don't want to
    /// install the certificate globally on the system. Has to be a PEM encoded
    /// file containing one or more X509 certificates.
    pub(crate) server_cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub(crate) enum TlsMode {
    Off,
    On,
    WithoutVerifyCert,
}

// Parsed from a plain string so that the same values work in the TOML file
// and in the `DB_TLS_MODE` environment variable.
impl TryFrom<String> for TlsMode {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "without-verify-cert" => Ok(Self::WithoutVerifyCert),
            other => Err(format!(
                "invalid TLS mode '{other}', expected 'on', 'without-verify-cert' or 'off'"
            )),
        }
    }
}

impl DbConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.server_cert.is_some() && self.tls_mode != TlsMode::On {
            bail!(r#"`db.server_cert` is set, but TLS mode is NOT "on", which makes no sense"#);
        }

        Ok(())
    }
}

/// Type alias for an owned DB connection.
pub(crate) type DbConnection = deadpool_postgres::Object;


/// Creates a new database connection pool. This does not open any connection
/// yet: use [`check_connection`] for that.
pub(crate) fn create_pool(config: &DbConfig) -> Result<Pool> {
    let pool_config = PoolConfig {
        user: Some(config.user.clone()),
        password: config.password.as_ref().map(|p| p.expose_secret().to_owned()),
        host: Some(config.host.clone()),
        port: Some(config.port),
        dbname: Some(config.database.clone()),
        ssl_mode: Some(if config.tls_mode == TlsMode::Off {
            deadpool_postgres::SslMode::Disable
        } else {
            deadpool_postgres::SslMode::Require
        }),
        application_name: Some("farmstand".into()),
        .. PoolConfig::default()
    };

    debug!(
        "Preparing pool for 'postgresql://{}:*****@{}:{}/{}' (TLS: {:?})",
        config.user,
        config.host,
        config.port,
        config.database,
        config.tls_mode,
    );

    // Handle TLS and create pool.
    let pool = if config.tls_mode == TlsMode::Off {
        pool_config.create_pool(Some(Runtime::Tokio1), NoTls)?
    } else {
        // Prepare certificate store. If we do not verify the certificate, it's
        // just empty. Otherwise we load system-wide root CAs.
        let mut root_certs = rustls::RootCertStore::empty();
        if config.tls_mode == TlsMode::On {
            let system_certs = rustls_native_certs::load_native_certs();
            for e in &system_certs.errors {
                warn!("Error while loading system-wide certificates: {e}");
            }

            let (added, ignored) = root_certs.add_parsable_certificates(system_certs.certs);
            debug!("Loaded {added} system-wide certificates ({ignored} ignored)");

            // If a custom cert is given, we try to load it.
            if let Some(cert_path) = &config.server_cert {
                let custom_count = load_pem_file(cert_path, &mut root_certs)
                    .with_context(|| format!("failed to load '{}'", cert_path.display()))?;
                debug!("Loaded {} certificates from '{}'", custom_count, cert_path.display());
            }
        }

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut tls_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("failed to configure TLS protocol versions")?
            .with_root_certificates(root_certs)
            .with_no_client_auth();

        // Disable certificate validation if requested.
        if config.tls_mode == TlsMode::WithoutVerifyCert {
            tls_config.dangerous().set_certificate_verifier(Arc::new(DangerousAlwaysAcceptCerts));
        }

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        pool_config.create_pool(Some(Runtime::Tokio1), tls)?
    };
    info!("Created database pool");

    Ok(pool)
}

/// Checks out one connection and executes a simple test query with it.
pub(crate) async fn check_connection(pool: &Pool) -> Result<()> {
    let client = pool.get().await
        .context("failed to get DB connection")?;
    client.execute("select 1", &[]).await
        .context("failed to execute DB test query")?;
    debug!("Successfully tested database connection with test query");

    // Make sure the database uses UTF8 encoding. Farm names and addresses
    // are arbitrary user text.
    let encoding = client.query_one("show server_encoding;", &[]).await
        .context("failed to check server encoding")?
        .get::<_, String>(0);

    if encoding != "UTF8" {
        warn!("Database encoding is '{encoding}' and not UTF8. Non-ASCII text might break.");
    }

    Ok(())
}

/// Loads the PEM file at `path` and adds all X509 certificates in it to
/// `root_certs`. Returns an error if a non-x509 item is found. Returns the
/// number of certs added to `root_certs`.
fn load_pem_file(path: &Path, root_certs: &mut rustls::RootCertStore) -> Result<usize> {
    let file = fs::read(path).context("could not read file")?;

    let mut count = 0;
    for item in rustls_pemfile::read_all(&mut &*file) {
        let item = item.context("could not parse file as PEM")?;
        if let rustls_pemfile::Item::X509Certificate(cert) = item {
            root_certs.add(cert).context("failed to load X509 certificate")?;
            count += 1;
        } else {
            bail!("found unexpected item, expected X509 certificate");
        }
    }

    Ok(count)
}

/// Dummy certificate verifier, that blindly always says "it's valid". This is
/// used in the "don't check certificates" mode. Signatures are still checked
/// with the default crypto provider.
#[derive(Debug)]
pub(crate) struct DangerousAlwaysAcceptCerts;

impl ServerCertVerifier for DangerousAlwaysAcceptCerts {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &signature_algorithms())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &signature_algorithms())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        signature_algorithms().supported_schemes()
    }
}

fn signature_algorithms() -> rustls::crypto::WebPkiSupportedAlgorithms {
    rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms
}
