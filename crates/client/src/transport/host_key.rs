//! Host key trust policies for the SSH transport

use crate::error::{ClientError, Result};
use podwire_core::{EndpointError, HostKeyPolicy};
use russh::keys::ssh_key::{Algorithm, Certificate, HashAlg, PublicKey};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug)]
enum Trust {
    Key(PublicKey),
    Authority(PublicKey),
    Anything,
}

/// Decides whether a server's host key is acceptable.
///
/// Built from the endpoint's [`HostKeyPolicy`] before any I/O, so malformed
/// key material fails validation instead of the handshake. The last
/// rejection is remembered so the dialer can report it even when the SSH
/// library surfaces a generic disconnect.
#[derive(Debug)]
pub struct HostKeyVerifier {
    trust: Trust,
    host: String,
    rejection: Mutex<Option<ClientError>>,
}

fn parse_key(parameter: &str, text: &str) -> std::result::Result<PublicKey, EndpointError> {
    PublicKey::from_openssh(text.trim()).map_err(|e| EndpointError::InvalidHostKey {
        parameter: parameter.to_string(),
        reason: e.to_string(),
    })
}

/// OpenSSH one-line form of a key, or its fingerprint when encoding fails
pub fn describe_key(key: &PublicKey) -> String {
    let mut key = key.clone();
    key.set_comment("");
    match key.to_openssh() {
        Ok(text) => text.trim_end().to_string(),
        Err(_) => key.fingerprint(HashAlg::Sha256).to_string(),
    }
}

impl HostKeyVerifier {
    pub fn new(policy: &HostKeyPolicy, host: &str) -> Result<Self> {
        let trust = match policy {
            HostKeyPolicy::PublicKey(text) => Trust::Key(parse_key("pubkey", text)?),
            HostKeyPolicy::CertificateAuthority(text) => Trust::Authority(parse_key("ca", text)?),
            HostKeyPolicy::TrustUnconditionally => Trust::Anything,
        };

        Ok(Self {
            trust,
            host: host.to_string(),
            rejection: Mutex::new(None),
        })
    }

    /// Host key algorithms implied by the policy: the pinned key's own
    /// algorithm, or `None` to leave the library defaults alone.
    pub fn implied_algorithms(&self) -> Option<Vec<Algorithm>> {
        match &self.trust {
            Trust::Key(key) => match key.algorithm() {
                Algorithm::Rsa { .. } => Some(vec![
                    Algorithm::Rsa {
                        hash: Some(HashAlg::Sha512),
                    },
                    Algorithm::Rsa {
                        hash: Some(HashAlg::Sha256),
                    },
                ]),
                other => Some(vec![other]),
            },
            _ => None,
        }
    }

    /// Whether the server must present a host certificate
    pub fn wants_certificate(&self) -> bool {
        matches!(self.trust, Trust::Authority(_))
    }

    /// Check a plain host key offered during key exchange
    pub fn verify(&self, key: &PublicKey) -> Result<()> {
        let result = match &self.trust {
            Trust::Key(expected) => {
                if expected.key_data() == key.key_data() {
                    debug!("Host key for {} matches pinned key", self.host);
                    Ok(())
                } else {
                    Err(ClientError::HostKeyMismatch {
                        expected: describe_key(expected),
                        actual: describe_key(key),
                    })
                }
            }
            Trust::Authority(ca) => Err(ClientError::HostKeyRejected(format!(
                "expected a host certificate signed by {}, got plain key {}",
                describe_key(ca),
                describe_key(key)
            ))),
            Trust::Anything => {
                warn!(
                    "Accepting host key {} for {} without verification",
                    key.fingerprint(HashAlg::Sha256),
                    self.host
                );
                Ok(())
            }
        };

        self.remember(result)
    }

    /// Check a host certificate against the configured certificate authority
    pub fn verify_certificate(&self, cert: &Certificate) -> Result<()> {
        let result = match &self.trust {
            Trust::Authority(ca) => self.check_certificate(ca, cert),
            Trust::Key(expected) => {
                if expected.key_data() == cert.public_key() {
                    Ok(())
                } else {
                    Err(ClientError::HostKeyMismatch {
                        expected: describe_key(expected),
                        actual: describe_key(&PublicKey::from(cert.public_key().clone())),
                    })
                }
            }
            Trust::Anything => {
                warn!(
                    "Accepting host certificate for {} without verification",
                    self.host
                );
                Ok(())
            }
        };

        self.remember(result)
    }

    fn check_certificate(&self, ca: &PublicKey, cert: &Certificate) -> Result<()> {
        let expected_ca = describe_key(ca);

        if !cert.cert_type().is_host() {
            return Err(ClientError::HostKeyRejected(format!(
                "certificate signed by {} is not a host certificate",
                expected_ca
            )));
        }

        if cert.signature_key() != ca.key_data() {
            return Err(ClientError::HostKeyRejected(format!(
                "expected a host certificate signed by {}, got one signed by {}",
                expected_ca,
                describe_key(&PublicKey::from(cert.signature_key().clone()))
            )));
        }

        // Signature and validity window
        let fingerprint = ca.fingerprint(HashAlg::Sha256);
        cert.validate([&fingerprint]).map_err(|e| {
            ClientError::HostKeyRejected(format!(
                "host certificate signed by {} failed validation: {}",
                expected_ca, e
            ))
        })?;

        let principals = cert.valid_principals();
        if !principals.is_empty() && !principals.iter().any(|p| p == &self.host) {
            return Err(ClientError::HostKeyRejected(format!(
                "host certificate is not valid for {}; principals: {}",
                self.host,
                principals.join(",")
            )));
        }

        debug!("Host certificate for {} signed by trusted CA", self.host);
        Ok(())
    }

    fn remember(&self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            let copy = match err {
                ClientError::HostKeyMismatch { expected, actual } => {
                    ClientError::HostKeyMismatch {
                        expected: expected.clone(),
                        actual: actual.clone(),
                    }
                }
                ClientError::HostKeyRejected(reason) => ClientError::HostKeyRejected(reason.clone()),
                other => ClientError::HostKeyRejected(other.to_string()),
            };
            let mut slot = self
                .rejection
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *slot = Some(copy);
        }
        result
    }

    /// The most recent rejection, if any
    pub fn take_rejection(&self) -> Option<ClientError> {
        self.rejection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}
