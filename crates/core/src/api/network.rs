//! Network payloads

use serde::{Deserialize, Serialize};

/// Body and response of `POST networks/create`, response of `GET networks/{nameOrId}/json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub dns_enabled: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub ipv6_enabled: bool,
    pub name: String,
}
