//! Secret operations

use super::{query, resource_path};
use crate::client::Client;
use crate::error::Result;
use podwire_core::api::{API_PREFIX, SecretCreated, SecretInspect};

const SECRET_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

impl Client {
    /// Store `data` under `name`. The value travels as the raw request body.
    pub async fn create_secret(&self, name: &str, data: &str) -> Result<SecretCreated> {
        let path = format!(
            "{}/secrets/create?{}",
            API_PREFIX,
            query(&[("name", name)])
        );
        self.create_with(&path, SECRET_CONTENT_TYPE, data.as_bytes().to_vec())
            .await
    }

    pub async fn inspect_secret(&self, name_or_id: &str) -> Result<SecretInspect> {
        self.get(&resource_path("secrets", name_or_id, "/json"))
            .await
    }

    pub async fn delete_secret(&self, name_or_id: &str) -> Result<()> {
        self.delete(&resource_path("secrets", name_or_id, ""))
            .await
    }
}
