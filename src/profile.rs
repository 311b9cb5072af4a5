use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{Client, JSON};
use crate::error::{Error, Result};

/// The signed-in member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct Profile<'a> {
    client: &'a Client,
}

impl Client {
    pub fn profile(&self) -> Profile<'_> {
        Profile { client: self }
    }
}

impl Profile<'_> {
    /// Account details, or `None` when the platform refuses the request
    /// (e.g. no token is configured).
    pub fn account_info(&self) -> Result<Option<AccountInfo>> {
        let url = &self.client.config().endpoints.member;
        match self.client.get_text(url, JSON) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(Error::Api { status, .. }) => {
                debug!(status, "account info unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
