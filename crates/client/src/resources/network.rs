//! Network operations

use super::resource_path;
use crate::client::Client;
use crate::error::Result;
use podwire_core::api::{API_PREFIX, Network};

impl Client {
    /// Create a network; the response echoes it with the assigned id
    pub async fn create_network(&self, network: &Network) -> Result<Network> {
        self.create(&format!("{}/networks/create", API_PREFIX), network)
            .await
    }

    pub async fn inspect_network(&self, name_or_id: &str) -> Result<Network> {
        self.get(&resource_path("networks", name_or_id, "/json"))
            .await
    }

    pub async fn delete_network(&self, name_or_id: &str) -> Result<()> {
        self.delete(&resource_path("networks", name_or_id, ""))
            .await
    }
}
