//! Image payloads and pull stream events

use serde::{Deserialize, Serialize};

/// Response of `GET images/{nameOrId}/json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(default, alias = "Names", alias = "RepoTags")]
    pub names: Option<Vec<String>>,
}

/// Query of `POST images/pull`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePullQuery {
    /// Pull policy: `always`, `missing`, `newer` or `never`
    pub policy: String,
    pub reference: String,
}

impl ImagePullQuery {
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self {
            policy: "always".to_string(),
            reference: reference.into(),
        }
    }

    pub fn with_policy<S: Into<String>>(mut self, policy: S) -> Self {
        self.policy = policy.into();
        self
    }
}

/// Credentials sent in the `X-Registry-Auth` header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryAuth {
    pub email: String,
    pub password: String,
    pub username: String,
}

impl RegistryAuth {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            email: String::new(),
            password: password.into(),
            username: username.into(),
        }
    }
}

/// `{"error": "..."}` line of a pull stream; terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullError {
    pub error: String,
}

/// `{"id": "...", "images": [...]}` line of a pull stream; the success signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullImages {
    #[serde(default)]
    pub id: String,
    pub images: Vec<String>,
}

/// `{"stream": "..."}` progress line of a pull stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullStream {
    pub stream: String,
}

/// One typed event of a pull stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullEvent {
    /// Progress text
    Progress(ImagePullStream),
    /// Remote failure; nothing else follows
    Error(ImagePullError),
    /// Pull finished with these image ids
    Images(ImagePullImages),
}

impl PullEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PullEvent::Error(_) | PullEvent::Images(_))
    }
}
