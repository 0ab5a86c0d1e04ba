//! Container host endpoint grammar
//!
//! A container host is named by a URL of the form
//! `scheme://[user[:password]@]host[:port][/path][#fragment]` where the scheme
//! is one of `tcp`, `unix` or `ssh`. For `ssh` the fragment is a query-string
//! shaped parameter set naming the host-key trust policy:
//!
//! - `#pubkey=<type> <base64>` trusts exactly one host key
//! - `#ca=<type> <base64>` trusts host certificates signed by one authority
//! - `#trust_unknown_host=1` trusts any key
//!
//! Parsing is pure: nothing here touches the network.

use crate::error::EndpointError;
use percent_encoding::percent_decode_str;
use std::fmt;
use url::Url;

/// Default SSH port when an ssh URL does not name one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default port when a tcp URL does not name one
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// `host:port`, with IPv6 literals in brackets
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Fragment parameter naming a trusted certificate authority
pub const FRAGMENT_CA: &str = "ca";
/// Fragment parameter naming a single trusted host key
pub const FRAGMENT_PUBKEY: &str = "pubkey";
/// Fragment parameter disabling host key verification
pub const FRAGMENT_TRUST_UNKNOWN_HOST: &str = "trust_unknown_host";

/// Transport scheme of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Tcp,
    Unix,
    Ssh,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Unix => "unix",
            Scheme::Ssh => "ssh",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the identity of a remote SSH server is established.
///
/// The key material is kept in its `authorized_keys` text form here; the
/// client parses it into key types when it resolves the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept only this host key
    PublicKey(String),
    /// Accept host certificates signed by this authority
    CertificateAuthority(String),
    /// Accept any host key
    TrustUnconditionally,
}

impl HostKeyPolicy {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyPolicy::PublicKey(_) => "pubkey",
            HostKeyPolicy::CertificateAuthority(_) => "ca",
            HostKeyPolicy::TrustUnconditionally => "trust_unknown_host",
        }
    }

    /// Resolve the policy from the fragment of an ssh URL.
    ///
    /// Exactly one policy must be present. A missing policy is an error rather
    /// than a silent fallback to accepting any key.
    pub fn from_fragment(fragment: Option<&str>) -> Result<Self, EndpointError> {
        let mut found = Vec::new();

        for (key, value) in url::form_urlencoded::parse(fragment.unwrap_or("").as_bytes()) {
            let policy = match key.as_ref() {
                FRAGMENT_CA => HostKeyPolicy::CertificateAuthority(non_empty_key(FRAGMENT_CA, &value)?),
                FRAGMENT_PUBKEY => HostKeyPolicy::PublicKey(non_empty_key(FRAGMENT_PUBKEY, &value)?),
                FRAGMENT_TRUST_UNKNOWN_HOST if value == "1" => HostKeyPolicy::TrustUnconditionally,
                _ => continue,
            };
            found.push(policy);
        }

        match found.len() {
            0 => Err(EndpointError::MissingHostKeyPolicy),
            1 => Ok(found.remove(0)),
            _ => Err(EndpointError::AmbiguousHostKeyPolicy {
                found: found
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

fn non_empty_key(parameter: &str, value: &str) -> Result<String, EndpointError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EndpointError::InvalidHostKey {
            parameter: parameter.to_string(),
            reason: "key is empty".to_string(),
        });
    }
    Ok(value.to_string())
}

/// A parsed container host URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    username: Option<String>,
    password: Option<String>,
    host_key_policy: Option<HostKeyPolicy>,
}

impl Endpoint {
    /// Parse and validate a container host URL
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(input).map_err(|e| EndpointError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = match url.scheme() {
            "tcp" => Scheme::Tcp,
            "unix" => Scheme::Unix,
            "ssh" => Scheme::Ssh,
            other => {
                return Err(EndpointError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string());
        let path = percent_decode_str(url.path()).decode_utf8_lossy().into_owned();
        let username = Some(decode(url.username())).filter(|u| !u.is_empty());
        let password = url.password().map(decode);

        let mut endpoint = Endpoint {
            scheme,
            host,
            port: url.port(),
            path,
            username,
            password,
            host_key_policy: None,
        };

        match scheme {
            Scheme::Tcp => {
                if endpoint.host.is_none() {
                    return Err(EndpointError::MissingHost {
                        url: redact(&url),
                    });
                }
                if endpoint.path.is_empty() {
                    endpoint.path = "/".to_string();
                }
            }
            Scheme::Unix => {
                if endpoint.path.is_empty() || endpoint.path == "/" {
                    return Err(EndpointError::MissingSocketPath {
                        url: redact(&url),
                    });
                }
            }
            Scheme::Ssh => {
                if endpoint.host.is_none() {
                    return Err(EndpointError::MissingHost {
                        url: redact(&url),
                    });
                }
                if endpoint.username.is_none() {
                    return Err(EndpointError::MissingUsername);
                }
                if endpoint.path.is_empty() || endpoint.path == "/" {
                    return Err(EndpointError::MissingSocketPath {
                        url: redact(&url),
                    });
                }
                endpoint.host_key_policy = Some(HostKeyPolicy::from_fragment(url.fragment())?);
            }
        }

        Ok(endpoint)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Port, with the scheme's default applied for tcp and ssh endpoints
    pub fn port(&self) -> Option<u16> {
        match self.scheme {
            Scheme::Tcp => Some(self.port.unwrap_or(DEFAULT_HTTP_PORT)),
            Scheme::Ssh => Some(self.port.unwrap_or(DEFAULT_SSH_PORT)),
            Scheme::Unix => self.port,
        }
    }

    /// `host:port` to dial for tcp and ssh endpoints
    pub fn authority(&self) -> Option<String> {
        Some(join_host_port(self.host.as_deref()?, self.port()?))
    }

    /// URL path; the socket path for unix and ssh endpoints
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Trust policy; always present for ssh endpoints
    pub fn host_key_policy(&self) -> Option<&HostKeyPolicy> {
        self.host_key_policy.as_ref()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.username {
            write!(f, "{user}@")?;
        }
        if let Some(host) = &self.host {
            if host.contains(':') {
                write!(f, "[{host}]")?;
            } else {
                f.write_str(host)?;
            }
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// URL text with any password and fragment removed, for error messages
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    let _ = url.set_password(None);
    url.set_fragment(None);
    url.to_string()
}
