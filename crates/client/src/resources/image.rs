//! Image operations

use super::{query, resource_path};
use crate::body;
use crate::client::{Client, check_status};
use crate::error::{ClientError, Result};
use crate::pull::PullEvents;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use podwire_core::api::{API_PREFIX, Image, ImagePullQuery, RegistryAuth};
use tracing::debug;

/// Header carrying encoded registry credentials
pub const REGISTRY_AUTH_HEADER: &str = "x-registry-auth";

/// Encode credentials for the `X-Registry-Auth` header
pub fn encode_registry_auth(auth: &RegistryAuth) -> Result<String> {
    let json = serde_json::to_vec(auth)
        .map_err(|e| ClientError::protocol(format!("failed to encode registry auth: {}", e)))?;
    Ok(URL_SAFE.encode(json))
}

impl Client {
    /// Start pulling an image and return its live event stream.
    ///
    /// The call returns once the response status is known; the events are
    /// read in the background. A successful pull is the arrival of a
    /// [`PullEvent::Images`](podwire_core::api::PullEvent::Images) event.
    pub async fn pull_image(
        &self,
        pull: &ImagePullQuery,
        auth: Option<&RegistryAuth>,
    ) -> Result<PullEvents> {
        let path = format!(
            "{}/images/pull?{}",
            API_PREFIX,
            query(&[
                ("policy", pull.policy.as_str()),
                ("reference", pull.reference.as_str()),
            ])
        );

        let mut headers = HeaderMap::new();
        if let Some(auth) = auth {
            let value = HeaderValue::from_str(&encode_registry_auth(auth)?)
                .map_err(|e| ClientError::protocol(format!("invalid registry auth header: {}", e)))?;
            headers.insert(HeaderName::from_static(REGISTRY_AUTH_HEADER), value);
        }

        let response = self
            .bounded(async {
                let (url, response) = self
                    .send(Method::POST, &path, headers, body::empty())
                    .await?;
                check_status(&url, response).await
            })
            .await?;

        debug!("Pulling {} with policy {}", pull.reference, pull.policy);
        Ok(PullEvents::spawn(response.into_body()))
    }

    pub async fn inspect_image(&self, name_or_id: &str) -> Result<Image> {
        self.get(&resource_path("images", name_or_id, "/json"))
            .await
    }

    pub async fn delete_image(&self, name_or_id: &str) -> Result<()> {
        self.delete(&resource_path("images", name_or_id, ""))
            .await
    }
}
