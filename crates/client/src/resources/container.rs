//! Container operations

use super::{escape_segment, resource_path};
use crate::client::Client;
use crate::error::Result;
use podwire_core::api::{API_PREFIX, ContainerCreate, ContainerCreated, ContainerInspect};
use tracing::debug;

impl Client {
    pub async fn create_container(&self, spec: &ContainerCreate) -> Result<ContainerCreated> {
        self.create(&format!("{}/containers/create", API_PREFIX), spec)
            .await
    }

    pub async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInspect> {
        self.get(&resource_path("containers", name_or_id, "/json"))
            .await
    }

    pub async fn rename_container(&self, name_or_id: &str, new_name: &str) -> Result<()> {
        let suffix = format!("/rename?name={}", escape_segment(new_name));
        self.signal(&resource_path("containers", name_or_id, &suffix))
            .await
    }

    pub async fn start_container(&self, name_or_id: &str) -> Result<()> {
        self.signal(&resource_path("containers", name_or_id, "/start"))
            .await
    }

    /// Stop a container. Stopping one that is already stopped succeeds.
    pub async fn stop_container(&self, name_or_id: &str) -> Result<()> {
        match self
            .signal(&resource_path("containers", name_or_id, "/stop?ignore=true"))
            .await
        {
            Err(e) if e.is_status(304) => {
                debug!("Container {} was already stopped", name_or_id);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn delete_container(&self, name_or_id: &str) -> Result<()> {
        self.delete(&resource_path("containers", name_or_id, ""))
            .await
    }
}
