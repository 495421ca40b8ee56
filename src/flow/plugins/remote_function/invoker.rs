use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FlowlineError, Result};

/// Reply of a remote function.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InvokeResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Boundary to the backend that runs vendor operations on the flow's behalf.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(
        &self,
        function_name: &str,
        body: Value,
    ) -> Result<InvokeResponse>;
}

/// Invoker posting to `<base_url>/functions/v1/<name>` with a bearer key.
pub struct HttpFunctionInvoker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpFunctionInvoker {
    pub fn new(
        base_url: &str,
        api_key: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn function_url(
        &self,
        function_name: &str,
    ) -> String {
        format!("{}/functions/v1/{}", self.base_url, function_name)
    }
}

#[async_trait]
impl FunctionInvoker for HttpFunctionInvoker {
    async fn invoke(
        &self,
        function_name: &str,
        body: Value,
    ) -> Result<InvokeResponse> {
        let res = self
            .client
            .post(self.function_url(function_name))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| FlowlineError::Plugin(format!("function '{}' unreachable: {}", function_name, err)))?;

        let status = res.status();
        let text = res.text().await.map_err(|err| FlowlineError::Plugin(err.to_string()))?;
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            let message = data.get("error").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| format!("function '{}' returned {}", function_name, status));
            return Ok(InvokeResponse {
                data,
                error: Some(message),
            });
        }
        Ok(InvokeResponse {
            data,
            error: None,
        })
    }
}
