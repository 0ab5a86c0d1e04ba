//! Secret payloads

use serde::{Deserialize, Serialize};

/// Response of `POST secrets/create`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretCreated {
    #[serde(alias = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecretInspectSpec {
    pub name: String,
}

/// Response of `GET secrets/{nameOrId}/json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecretInspect {
    #[serde(alias = "ID")]
    pub id: String,
    pub secret_data: String,
    pub spec: SecretInspectSpec,
}
