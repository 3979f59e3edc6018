//! Chat client: adapter + transport + decoder behind one trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::adapter::build_request;
use crate::decoder::{ChunkDecoder, Delta};
use crate::error::LlmError;
use crate::message::ChatMessage;
use crate::provider::{ProviderConfig, ProviderId};
use crate::transport::{StreamTransport, TransportConfig};

/// Text deltas of one model turn, in arrival order
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Anything that can stream a model turn for a conversation.
///
/// The agent loop only talks to this trait, which keeps it independent of
/// vendor details and lets tests script model output.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model name used for requests
    fn model(&self) -> &str;

    /// Start streaming the next assistant turn.
    ///
    /// The returned stream ends after the vendor's end-of-message marker or
    /// when `cancel` fires. Dropping it closes the connection.
    async fn stream_chat(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<DeltaStream, LlmError>;
}

/// Model information from a local Ollama's `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<LocalModel>,
}

/// HTTP chat client for one provider and model
#[derive(Clone)]
pub struct ChatClient {
    provider: ProviderConfig,
    model: String,
    token: Option<String>,
    transport: StreamTransport,
}

impl ChatClient {
    pub fn new(
        provider: ProviderConfig,
        model: impl Into<String>,
        token: Option<String>,
        transport: TransportConfig,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            provider,
            model: model.into(),
            token,
            transport: StreamTransport::new(transport)?,
        })
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// List models installed in the local Ollama behind this client's
    /// endpoint.
    pub async fn list_local_models(&self) -> Result<Vec<LocalModel>, LlmError> {
        if self.provider.id != ProviderId::Ollama {
            return Err(LlmError::NotConfigured(format!(
                "model listing is only available for ollama, not '{}'",
                self.provider.id
            )));
        }
        let url = format!("{}/api/tags", ollama_base_url(&self.provider.chat_endpoint_url));

        let resp = tokio::time::timeout(self.transport.config().read_timeout, self.transport.http().get(&url).send())
            .await
            .map_err(|_| LlmError::Timeout(format!("no response from {}", url)))?
            .map_err(LlmError::from_reqwest)?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Http { status, body });
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ProtocolMismatch(format!("failed to parse model list: {}", e)))?;
        Ok(tags.models)
    }
}

/// `http://host:11434/api/chat` -> `http://host:11434`
fn ollama_base_url(chat_url: &str) -> &str {
    let trimmed = chat_url.trim_end_matches('/');
    trimmed.strip_suffix("/api/chat").unwrap_or(trimmed)
}

#[async_trait]
impl ChatBackend for ChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(provider = %self.provider.id, model = %self.model, messages = history.len()))]
    async fn stream_chat(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<DeltaStream, LlmError> {
        let request = build_request(
            &self.provider,
            &self.model,
            self.token.as_deref(),
            history,
            system_prompt,
        )?;
        let mut chunks = self.transport.open(&request, cancel).await?;
        let mut decoder = ChunkDecoder::new(self.provider.request_shape);
        let cancel = cancel.clone();

        let stream = async_stream::stream! {
            while let Some(chunk) = chunks.next().await {
                if cancel.is_cancelled() {
                    debug!("Discarding chunk received after cancellation");
                    return;
                }
                let deltas = match chunk.and_then(|bytes| decoder.push(&bytes)) {
                    Ok(deltas) => deltas,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                for delta in deltas {
                    match delta {
                        Delta::Text(text) => yield Ok(text),
                        Delta::Done => return,
                    }
                }
            }

            if cancel.is_cancelled() {
                return;
            }
            match decoder.finish() {
                Ok(deltas) => {
                    for delta in deltas {
                        if let Delta::Text(text) = delta {
                            yield Ok(text);
                        }
                    }
                }
                Err(e) => yield Err(e),
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_server::{serve_once, Then};
    use tokio::sync::oneshot;

    const SSE_HEAD: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
    const NDJSON_HEAD: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n";

    async fn collect(mut stream: DeltaStream) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }

    #[test]
    fn test_ollama_base_url() {
        assert_eq!(ollama_base_url("http://localhost:11434/api/chat"), "http://localhost:11434");
        assert_eq!(ollama_base_url("http://gpu-box:11434/api/chat/"), "http://gpu-box:11434");
        assert_eq!(ollama_base_url("http://gpu-box:11434"), "http://gpu-box:11434");
    }

    #[tokio::test]
    async fn test_openai_stream_end_to_end() {
        let (url, req_rx) = serve_once(
            SSE_HEAD,
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"<answer>\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"done</answer>\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
            Then::Close,
        )
        .await;
        let provider = ProviderConfig::builtin(ProviderId::Custom).with_endpoint(url);
        let client = ChatClient::new(provider, "m", None, TransportConfig::default()).unwrap();

        let stream = client
            .stream_chat(&[ChatMessage::user("hi")], "sys", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(collect(stream).await.unwrap(), "<answer>done</answer>");

        let raw = req_rx.await.unwrap();
        assert!(raw.ends_with(
            r#"{"model":"m","messages":[{"role":"system","content":"sys"},{"role":"user","content":"hi"}],"stream":true}"#
        ));
    }

    #[tokio::test]
    async fn test_ollama_stream_end_to_end() {
        let (url, _req) = serve_once(
            NDJSON_HEAD,
            vec![
                "{\"message\":{\"role\":\"assistant\",\"content\":\"hel\"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n{\"done\":true}\n",
            ],
            Then::Close,
        )
        .await;
        let provider = ProviderConfig::builtin(ProviderId::Ollama).with_endpoint(url);
        let client = ChatClient::new(provider, "gemma3", None, TransportConfig::default()).unwrap();
        let stream = client
            .stream_chat(&[ChatMessage::user("hi")], "", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(collect(stream).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_protocol_mismatch_surfaces() {
        let (url, _req) = serve_once(SSE_HEAD, vec!["data: {\"unexpected\":true}\n\n"], Then::Close).await;
        let provider = ProviderConfig::builtin(ProviderId::Custom).with_endpoint(url);
        let client = ChatClient::new(provider, "m", None, TransportConfig::default()).unwrap();
        let stream = client
            .stream_chat(&[ChatMessage::user("hi")], "", &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(collect(stream).await, Err(LlmError::ProtocolMismatch(_))));
    }

    #[tokio::test]
    async fn test_no_deltas_after_cancel() {
        let (hung_tx, hung_rx) = oneshot::channel();
        let (url, _req) = serve_once(
            SSE_HEAD,
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            ],
            Then::HoldOpen(hung_tx),
        )
        .await;
        let provider = ProviderConfig::builtin(ProviderId::Custom).with_endpoint(url);
        let client = ChatClient::new(provider, "m", None, TransportConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        let mut stream = client
            .stream_chat(&[ChatMessage::user("hi")], "", &cancel)
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        cancel.cancel();

        // At most one straggler may already be in flight
        let mut after = 0;
        while let Some(item) = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next())
            .await
            .unwrap()
        {
            assert!(item.is_ok());
            after += 1;
        }
        assert!(after <= 1);
        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(2), hung_rx)
            .await
            .unwrap()
            .unwrap();
    }
}
