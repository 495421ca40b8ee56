use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    NoAuth,
    Bearer,
    Basic,
    Custom,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
pub enum HttpRequestMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ContentType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "text")]
    Text,
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "urlencoded")]
    UrlEncoded,
    #[serde(rename = "form-data")]
    FormData,
}

fn default_timeout() -> u64 {
    30_000
}

/// Bound inputs of an http_request node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpRequestMethod,
    #[serde(default)]
    pub headers: HashMap<String, JsonValue>,
    #[serde(default)]
    pub params: HashMap<String, JsonValue>,
    #[serde(default)]
    pub body: Option<JsonValue>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// header carrying the credential, `Authorization` when unset
    #[serde(default)]
    pub auth_header: Option<String>,
    /// request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}
