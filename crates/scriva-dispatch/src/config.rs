//! Broker connection and security configuration.
//!
//! Exactly one [`SecurityMode`] variant is active at a time, selected by an
//! explicit mode string plus the fields that mode requires. Missing
//! required fields are a fatal [`Error::Config`] raised at construction,
//! never at publish time.

use std::path::PathBuf;

use scriva_core::{defaults, Error, Result};

/// Transport-encryption parameters shared by the TLS-carrying modes.
#[derive(Debug, Clone, Default)]
pub struct TlsParams {
    /// CA certificate used for broker trust verification.
    pub ca_cert: Option<PathBuf>,
    /// Optional client certificate for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// Private key for the client certificate.
    pub client_key: Option<PathBuf>,
    /// Whether to verify the broker certificate against its hostname.
    pub verify_hostname: bool,
}

/// Password hashing mechanism for credential-based authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "plain" => Ok(SaslMechanism::Plain),
            "scram_sha_256" | "scram_sha256" => Ok(SaslMechanism::ScramSha256),
            "scram_sha_512" | "scram_sha512" => Ok(SaslMechanism::ScramSha512),
            other => Err(Error::Config(format!("unknown SASL mechanism: {}", other))),
        }
    }

    fn wire_name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// The closed set of broker security modes.
#[derive(Debug, Clone)]
pub enum SecurityMode {
    /// No encryption, no authentication.
    Plaintext,
    /// Transport encryption only.
    Tls(TlsParams),
    /// Username/password authentication, under plaintext or encrypted
    /// transport depending on `tls`.
    Sasl {
        tls: Option<TlsParams>,
        mechanism: SaslMechanism,
        username: String,
        password: String,
    },
    /// Kerberos ticket authentication (service/principal/keytab triple),
    /// under plaintext or encrypted transport depending on `tls`.
    Kerberos {
        tls: Option<TlsParams>,
        service_name: String,
        principal: String,
        keytab: PathBuf,
    },
}

impl SecurityMode {
    /// The `security.protocol` value this mode lowers to.
    pub fn protocol(&self) -> &'static str {
        match self {
            SecurityMode::Plaintext => "plaintext",
            SecurityMode::Tls(_) => "ssl",
            SecurityMode::Sasl { tls: None, .. } => "sasl_plaintext",
            SecurityMode::Sasl { tls: Some(_), .. } => "sasl_ssl",
            SecurityMode::Kerberos { tls: None, .. } => "sasl_plaintext",
            SecurityMode::Kerberos { tls: Some(_), .. } => "sasl_ssl",
        }
    }

    /// Lower this mode onto librdkafka configuration key/value pairs.
    pub fn client_config_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("security.protocol".to_string(), self.protocol().to_string())];

        let push_tls = |pairs: &mut Vec<(String, String)>, tls: &TlsParams| {
            if let Some(ca) = &tls.ca_cert {
                pairs.push(("ssl.ca.location".into(), ca.display().to_string()));
            }
            if let Some(cert) = &tls.client_cert {
                pairs.push(("ssl.certificate.location".into(), cert.display().to_string()));
            }
            if let Some(key) = &tls.client_key {
                pairs.push(("ssl.key.location".into(), key.display().to_string()));
            }
            pairs.push((
                "ssl.endpoint.identification.algorithm".into(),
                if tls.verify_hostname { "https" } else { "none" }.to_string(),
            ));
        };

        match self {
            SecurityMode::Plaintext => {}
            SecurityMode::Tls(tls) => push_tls(&mut pairs, tls),
            SecurityMode::Sasl {
                tls,
                mechanism,
                username,
                password,
            } => {
                if let Some(tls) = tls {
                    push_tls(&mut pairs, tls);
                }
                pairs.push(("sasl.mechanism".into(), mechanism.wire_name().to_string()));
                pairs.push(("sasl.username".into(), username.clone()));
                pairs.push(("sasl.password".into(), password.clone()));
            }
            SecurityMode::Kerberos {
                tls,
                service_name,
                principal,
                keytab,
            } => {
                if let Some(tls) = tls {
                    push_tls(&mut pairs, tls);
                }
                pairs.push(("sasl.mechanism".into(), "GSSAPI".to_string()));
                pairs.push(("sasl.kerberos.service.name".into(), service_name.clone()));
                pairs.push(("sasl.kerberos.principal".into(), principal.clone()));
                pairs.push(("sasl.kerberos.keytab".into(), keytab.display().to_string()));
            }
        }

        pairs
    }

    /// Validate that the selected mode carries everything it requires.
    pub fn validate(&self) -> Result<()> {
        match self {
            SecurityMode::Plaintext | SecurityMode::Tls(_) => Ok(()),
            SecurityMode::Sasl {
                username, password, ..
            } => {
                if username.is_empty() {
                    return Err(Error::Config("SASL username is required".into()));
                }
                if password.is_empty() {
                    return Err(Error::Config("SASL password is required".into()));
                }
                Ok(())
            }
            SecurityMode::Kerberos {
                service_name,
                principal,
                keytab,
                ..
            } => {
                if service_name.is_empty() {
                    return Err(Error::Config("Kerberos service name is required".into()));
                }
                if principal.is_empty() {
                    return Err(Error::Config("Kerberos principal is required".into()));
                }
                if keytab.as_os_str().is_empty() {
                    return Err(Error::Config("Kerberos keytab path is required".into()));
                }
                Ok(())
            }
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Feature flag; when false the dispatcher is a logged no-op.
    pub enabled: bool,
    /// Broker address list.
    pub brokers: Vec<String>,
    /// Producer client identifier.
    pub client_id: String,
    /// Active security mode.
    pub security: SecurityMode,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: vec![defaults::DEFAULT_DISPATCH_BROKERS.to_string()],
            client_id: defaults::DEFAULT_DISPATCH_CLIENT_ID.to_string(),
            security: SecurityMode::Plaintext,
        }
    }
}

impl DispatchConfig {
    /// Read configuration from environment variables and validate it.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KAFKA_ENABLED` | `false` | Enable event dispatch |
    /// | `KAFKA_BROKERS` | `localhost:9092` | Comma-separated broker list |
    /// | `KAFKA_CLIENT_ID` | `scriva-pipeline` | Producer client id |
    /// | `KAFKA_SECURITY_MODE` | `plaintext` | `plaintext`, `tls`, `sasl`, `sasl_tls`, `kerberos`, `kerberos_tls` |
    ///
    /// SASL modes additionally require `KAFKA_SASL_USERNAME` and
    /// `KAFKA_SASL_PASSWORD` (`KAFKA_SASL_MECHANISM` defaults to `plain`);
    /// Kerberos modes require `KAFKA_KRB_SERVICE_NAME`,
    /// `KAFKA_KRB_PRINCIPAL`, and `KAFKA_KRB_KEYTAB`. Missing fields fail
    /// here, at startup.
    pub fn from_env() -> Result<Self> {
        let enabled = std::env::var(defaults::ENV_DISPATCH_ENABLED)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let brokers: Vec<String> = std::env::var(defaults::ENV_DISPATCH_BROKERS)
            .unwrap_or_else(|_| defaults::DEFAULT_DISPATCH_BROKERS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let client_id = std::env::var(defaults::ENV_DISPATCH_CLIENT_ID)
            .unwrap_or_else(|_| defaults::DEFAULT_DISPATCH_CLIENT_ID.to_string());

        let mode = std::env::var(defaults::ENV_DISPATCH_SECURITY)
            .unwrap_or_else(|_| "plaintext".to_string());

        let tls_from_env = || TlsParams {
            ca_cert: std::env::var("KAFKA_SSL_CA_CERT").ok().map(PathBuf::from),
            client_cert: std::env::var("KAFKA_SSL_CLIENT_CERT").ok().map(PathBuf::from),
            client_key: std::env::var("KAFKA_SSL_CLIENT_KEY").ok().map(PathBuf::from),
            verify_hostname: std::env::var("KAFKA_SSL_VERIFY_HOSTNAME")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        };

        let sasl_from_env = |tls: Option<TlsParams>| -> Result<SecurityMode> {
            let mechanism = match std::env::var("KAFKA_SASL_MECHANISM") {
                Ok(value) => SaslMechanism::parse(&value)?,
                Err(_) => SaslMechanism::Plain,
            };
            Ok(SecurityMode::Sasl {
                tls,
                mechanism,
                username: std::env::var("KAFKA_SASL_USERNAME").unwrap_or_default(),
                password: std::env::var("KAFKA_SASL_PASSWORD").unwrap_or_default(),
            })
        };

        let kerberos_from_env = |tls: Option<TlsParams>| SecurityMode::Kerberos {
            tls,
            service_name: std::env::var("KAFKA_KRB_SERVICE_NAME").unwrap_or_default(),
            principal: std::env::var("KAFKA_KRB_PRINCIPAL").unwrap_or_default(),
            keytab: PathBuf::from(std::env::var("KAFKA_KRB_KEYTAB").unwrap_or_default()),
        };

        let security = match mode.as_str() {
            "plaintext" => SecurityMode::Plaintext,
            "tls" | "ssl" => SecurityMode::Tls(tls_from_env()),
            "sasl" | "sasl_plaintext" => sasl_from_env(None)?,
            "sasl_tls" | "sasl_ssl" => sasl_from_env(Some(tls_from_env()))?,
            "kerberos" => kerberos_from_env(None),
            "kerberos_tls" | "kerberos_ssl" => kerberos_from_env(Some(tls_from_env())),
            other => {
                return Err(Error::Config(format!("unknown security mode: {}", other)));
            }
        };

        let config = Self {
            enabled,
            brokers,
            client_id,
            security,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration. Called by [`Self::from_env`] and
    /// again by the dispatcher constructor for programmatic configs.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.brokers.is_empty() {
            return Err(Error::Config("broker address list is empty".into()));
        }
        self.security.validate()
    }
}
