//! HTTP agent invoker — dispatches payloads to a remote agent service.
//!
//! POST {base_url}/agents/{agent_ref}/invoke
//! Headers:
//!   authorization: Bearer {token}   (when configured)
//!   content-type: application/json
//!
//! The service is expected to answer with the [`AgentReply`] shape:
//! `{ "output": ..., "usage": { "inputTokens": ..., "outputTokens": ... } }`.

use async_trait::async_trait;

use super::{AgentInvoker, AgentPayload, AgentReply};

pub struct HttpAgentInvoker {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpAgentInvoker {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300)) // 5 min timeout
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(&self, agent_ref: &str, payload: &AgentPayload) -> Result<AgentReply, String> {
        let url = format!("{}/agents/{}/invoke", self.base_url, agent_ref);

        let mut request = self.client.post(&url).json(payload);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Agent request to '{}' failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "Agent '{}' returned HTTP {}: {}",
                agent_ref, status, body
            ));
        }

        response
            .json::<AgentReply>()
            .await
            .map_err(|e| format!("Agent '{}' returned an unparseable reply: {}", agent_ref, e))
    }
}
