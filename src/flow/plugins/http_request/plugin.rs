use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde_json::{Map, Value, json};

use crate::{
    FlowlineError, Result,
    flow::plugins::{InputType, NodeInput, NodeOutput, NodePlugin, validate_inputs, with_defaults},
    runtime::ExecutionContext,
};

use super::models::*;

pub const HTTP_REQUEST_NODE_TYPE: &str = "http_request";

const STATUS_CODE_KEY: &str = "status_code";
const HEADERS_KEY: &str = "headers";
const BODY_KEY: &str = "body";
const DATA_KEY: &str = "data";
const SUCCESS_KEY: &str = "success";

/// Generic HTTP call node.
pub struct HttpRequestPlugin {
    client: reqwest::Client,
}

impl Default for HttpRequestPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequestPlugin {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Apply authorization headers based on auth config
    fn apply_auth_headers(
        config: &HttpRequestConfig,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        if config.auth_type == AuthType::NoAuth {
            return Ok(());
        }
        let api_key = config.api_key.as_ref().filter(|k| !k.is_empty()).ok_or_else(|| FlowlineError::Plugin("api_key is required for authorized requests".to_string()))?;

        let header_name = config.auth_header.as_deref().filter(|h| !h.is_empty()).unwrap_or("Authorization");
        let header_key: HeaderName = header_name.parse().map_err(|err: reqwest::header::InvalidHeaderName| FlowlineError::Plugin(err.to_string()))?;

        let header_value = match config.auth_type {
            AuthType::Bearer => format!("Bearer {}", api_key),
            AuthType::Basic => {
                let encoded = if api_key.contains(':') {
                    STANDARD.encode(api_key.as_bytes())
                } else {
                    api_key.clone()
                };
                format!("Basic {}", encoded)
            }
            AuthType::Custom | AuthType::NoAuth => api_key.clone(),
        };

        headers.insert(
            header_key,
            header_value.parse().map_err(|err: InvalidHeaderValue| FlowlineError::Plugin(err.to_string()))?,
        );
        Ok(())
    }

    fn build_request(
        &self,
        config: &HttpRequestConfig,
    ) -> Result<reqwest::RequestBuilder> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));

        Self::apply_auth_headers(config, &mut headers)?;

        for (key, value) in &config.headers {
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| FlowlineError::Plugin(err.to_string()))?,
                text_of(value).parse().map_err(|err: InvalidHeaderValue| FlowlineError::Plugin(err.to_string()))?,
            );
        }

        let query: Vec<(String, String)> = config.params.iter().map(|(k, v)| (k.clone(), text_of(v))).collect();

        let method: reqwest::Method = config.method.as_ref().parse().map_err(|_| FlowlineError::Plugin(format!("invalid method '{:?}'", config.method)))?;
        let mut request = self.client.request(method, &config.url).headers(headers).query(&query);

        if let Some(body) = &config.body {
            match config.content_type {
                ContentType::None => {}
                ContentType::Text => {
                    request = request.body(text_of(body));
                }
                ContentType::Json => {
                    // a JSON document typed into a text field arrives as a string
                    let payload = match body {
                        Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or_else(|_| body.clone()),
                        _ => body.clone(),
                    };
                    request = request.header(reqwest::header::CONTENT_TYPE, "application/json").body(serde_json::to_vec(&payload)?);
                }
                ContentType::UrlEncoded | ContentType::FormData => {
                    let form = body.as_object().ok_or(FlowlineError::Plugin("content_type did not match the body content".to_string()))?;
                    let fields: Vec<(String, String)> = form.iter().map(|(k, v)| (k.clone(), text_of(v))).collect();
                    request = request.form(&fields);
                }
            }
        }

        Ok(request.timeout(Duration::from_millis(config.timeout)))
    }
}

/// Strings as-is, everything else as JSON text.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl NodePlugin for HttpRequestPlugin {
    fn node_type(&self) -> &str {
        HTTP_REQUEST_NODE_TYPE
    }

    fn inputs(&self) -> Vec<NodeInput> {
        let methods = [("GET", "GET"), ("POST", "POST"), ("PUT", "PUT"), ("PATCH", "PATCH"), ("DELETE", "DELETE"), ("HEAD", "HEAD"), ("OPTIONS", "OPTIONS")];
        let with_body = vec![json!("POST"), json!("PUT"), json!("PATCH")];
        let with_key = vec![json!("bearer"), json!("basic"), json!("custom")];
        vec![
            NodeInput::new("url", InputType::Text).label("URL").required(),
            NodeInput::new("method", InputType::Select).label("Method").options(&methods).default_value(json!("GET")),
            NodeInput::new("headers", InputType::Json).label("Headers"),
            NodeInput::new("params", InputType::Json).label("Query Parameters"),
            NodeInput::new("content_type", InputType::Select)
                .label("Content Type")
                .options(&[("None", "none"), ("Text", "text"), ("JSON", "json"), ("URL Encoded", "urlencoded"), ("Form Data", "form-data")])
                .default_value(json!("json"))
                .show_when("method", with_body.clone()),
            NodeInput::new("body", InputType::Json).label("Body").show_when("method", with_body),
            NodeInput::new("auth_type", InputType::Select)
                .label("Authorization")
                .options(&[("None", "no_auth"), ("Bearer", "bearer"), ("Basic", "basic"), ("Custom", "custom")])
                .default_value(json!("no_auth")),
            NodeInput::new("api_key", InputType::Text).label("API Key").required().show_when("auth_type", with_key.clone()),
            NodeInput::new("auth_header", InputType::Text).label("Header Name").show_when("auth_type", with_key),
            NodeInput::new("timeout", InputType::Number).label("Timeout (ms)").default_value(json!(30_000)),
        ]
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        vec![
            NodeOutput::new(STATUS_CODE_KEY, "Status Code"),
            NodeOutput::new(HEADERS_KEY, "Headers"),
            NodeOutput::new(BODY_KEY, "Body"),
            NodeOutput::new(DATA_KEY, "Data"),
            NodeOutput::new(SUCCESS_KEY, "Success"),
        ]
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let declared = self.inputs();
        let inputs = with_defaults(&declared, inputs);
        validate_inputs(&declared, &inputs)?;
        let config = serde_json::from_value::<HttpRequestConfig>(Value::Object(inputs))?;

        tracing::debug!(run_id = %ctx.run_id(), node_id = %ctx.node_id(), method = config.method.as_ref(), url = %config.url, "http request");
        let res = self.build_request(&config)?.send().await.map_err(|err| FlowlineError::Plugin(format!("http error: {}", err)))?;

        let status = res.status();
        let headers: HashMap<String, String> = res.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
        let body = res.text().await.map_err(|err| FlowlineError::Plugin(err.to_string()))?;
        let data = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| Value::String(body.clone()));

        let mut outputs = Map::new();
        outputs.insert(STATUS_CODE_KEY.to_string(), status.as_u16().into());
        outputs.insert(HEADERS_KEY.to_string(), serde_json::to_value(headers)?);
        outputs.insert(BODY_KEY.to_string(), body.into());
        outputs.insert(DATA_KEY.to_string(), data);
        outputs.insert(SUCCESS_KEY.to_string(), status.is_success().into());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> HttpRequestConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_build_request_with_bearer() {
        let plugin = HttpRequestPlugin::new();
        let cfg = config(json!({
            "url": "http://localhost:8080/users",
            "method": "POST",
            "headers": {"x-trace": 42},
            "params": {"page": "2"},
            "body": {"name": "ann"},
            "auth_type": "bearer",
            "api_key": "secret"
        }));
        let request = plugin.build_request(&cfg).unwrap().build().unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "http://localhost:8080/users?page=2");
        assert_eq!(request.headers()["authorization"], "Bearer secret");
        assert_eq!(request.headers()["x-trace"], "42");
        assert_eq!(request.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_basic_auth_encodes_pairs() {
        let mut headers = HeaderMap::new();
        let cfg = config(json!({"url": "http://x", "auth_type": "basic", "api_key": "user:pass"}));
        HttpRequestPlugin::apply_auth_headers(&cfg, &mut headers).unwrap();
        assert_eq!(headers["authorization"], format!("Basic {}", STANDARD.encode("user:pass")));
    }

    #[test]
    fn test_auth_requires_key() {
        let mut headers = HeaderMap::new();
        let cfg = config(json!({"url": "http://x", "auth_type": "custom", "auth_header": "x-api-key"}));
        assert!(HttpRequestPlugin::apply_auth_headers(&cfg, &mut headers).is_err());
    }

    #[tokio::test]
    async fn test_execute_rejects_invalid_inputs() {
        let ctx = ExecutionContext::new("f", "r", &Default::default(), Value::Null);
        let inputs = json!({"method": "GET"}).as_object().unwrap().clone();
        let err = HttpRequestPlugin::new().execute(inputs, &ctx).await.unwrap_err();
        assert!(matches!(err, FlowlineError::Plugin(_)));
    }
}
