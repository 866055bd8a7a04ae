// OpenAI互換チャット補完APIクライアント
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::info;

use super::schemas::openai_response::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::DEFAULT_BASE_URL;
use crate::rewriter::RequestRewriter;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

// 送信先は常にデフォルトホスト宛てに組み立て、実際のホストはRequestRewriterが差し替える
pub struct LlmClient {
    client: reqwest::Client,
    rewriter: RequestRewriter,
    url: String,
}

impl LlmClient {
    pub fn new(rewriter: RequestRewriter) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| anyhow!("HTTPクライアントの作成に失敗: {}", e))?;

        Ok(Self::with_client(client, rewriter))
    }

    pub fn with_client(client: reqwest::Client, rewriter: RequestRewriter) -> Self {
        LlmClient {
            client,
            rewriter,
            url: format!("{}{}", DEFAULT_BASE_URL, CHAT_COMPLETIONS_PATH),
        }
    }

    pub fn rewriter(&self) -> &RequestRewriter {
        &self.rewriter
    }

    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let http_request = self.client.post(&self.url).json(request).build()?;
        let http_request = self.rewriter.rewrite(http_request);

        info!(
            "💬 チャット補完リクエスト: {} (モデル: {}, メッセージ数: {})",
            http_request.url(),
            request.model,
            request.messages.len()
        );

        let response = self.client.execute(http_request).await?;

        if response.status().is_success() {
            let completion: ChatCompletionResponse = response.json().await?;
            if let Some(usage) = &completion.usage {
                info!("✅ 応答受信: {} (トークン数: {})", completion.id, usage.total_tokens);
            }
            Ok(completion)
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!(
                "LLM API エラー: ステータス {}, レスポンス: {}",
                status,
                error_text
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::llm::schemas::openai_response::ChatMessage;
    use crate::rewriter::ConfigCache;
    use crate::test_support::StubServer;
    use std::sync::Arc;

    fn client_for(base_url: &str, api_key: &str) -> LlmClient {
        let cache = ConfigCache::new();
        cache.set(Arc::new(EndpointConfig {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model_name: "test-model".to_string(),
        }));
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        LlmClient::with_client(http, RequestRewriter::new(cache))
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::user("hello")],
            temperature: 0.7,
            max_tokens: Some(256),
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_request_is_sent_to_configured_host() {
        let server = StubServer::start(|_| {
            (
                200,
                r#"{"id":"c1","object":"chat.completion","created":1,"model":"test-model",
                    "choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#
                    .to_string(),
            )
        })
        .await;

        let client = client_for(&server.base_url, "sk-test");
        let response = client.chat_completion(&request()).await.unwrap();
        assert_eq!(response.choices[0].message.content, "hi");

        let recorded = server.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].path, CHAT_COMPLETIONS_PATH);
        assert_eq!(recorded[0].header("authorization"), Some("Bearer sk-test"));

        let body = recorded[0].json();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server =
            StubServer::start(|_| (401, r#"{"error":"invalid api key"}"#.to_string())).await;

        let client = client_for(&server.base_url, "sk-wrong");
        let error = client.chat_completion(&request()).await.unwrap_err();
        let message = error.to_string();
        assert!(message.contains("401"));
        assert!(message.contains("invalid api key"));
    }
}
