//! Cancellable streaming HTTP transport
//!
//! The response body is read on a dedicated task and forwarded one chunk at
//! a time, so the consumer can check for cancellation between chunks and
//! dropping the stream closes the connection.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::HttpRequest;
use crate::error::LlmError;

/// Raw body chunks as they arrive from the socket
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Connection timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Time allowed to establish the TCP/TLS connection
    pub connect_timeout: Duration,
    /// Longest silence tolerated while waiting for response headers or the
    /// next body chunk
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(120),
        }
    }
}

/// Streaming HTTP transport
#[derive(Debug, Clone)]
pub struct StreamTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl StreamTransport {
    pub fn new(config: TransportConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST the request and return the lazily streamed response body.
    ///
    /// Status codes >= 400 are returned as [`LlmError::Http`] with the error
    /// body. Once `cancel` fires no further chunks are forwarded and the
    /// connection is dropped.
    pub async fn open(&self, request: &HttpRequest, cancel: &CancellationToken) -> Result<ChunkStream, LlmError> {
        let mut builder = self.client.post(&request.url).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(url = %request.url, bytes = request.body.len(), "Opening stream");

        let read_timeout = self.config.read_timeout;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = tokio::time::timeout(read_timeout, builder.send()) => match sent {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return Err(LlmError::from_reqwest(e)),
                Err(_) => {
                    return Err(LlmError::Timeout(format!(
                        "no response headers within {}s",
                        read_timeout.as_secs()
                    )))
                }
            },
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = match tokio::time::timeout(read_timeout, response.text()).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            };
            warn!(status = status.as_u16(), "Provider returned an error status");
            return Err(LlmError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, mut rx) = mpsc::channel::<Result<Bytes, LlmError>>(1);
        let worker_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = worker_cancel.cancelled() => {
                        debug!("Stream cancelled, closing connection");
                        break;
                    }
                    next = tokio::time::timeout(read_timeout, body.next()) => next,
                };

                let item = match next {
                    Ok(Some(Ok(bytes))) => Ok(bytes),
                    Ok(Some(Err(e))) => Err(LlmError::from_reqwest(e)),
                    Ok(None) => break,
                    Err(_) => Err(LlmError::Timeout(format!(
                        "no data received for {}s",
                        read_timeout.as_secs()
                    ))),
                };
                let failed = item.is_err();

                tokio::select! {
                    biased;
                    _ = worker_cancel.cancelled() => break,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            // Consumer dropped the stream
                            break;
                        }
                    }
                }
                if failed {
                    break;
                }
            }
            // `body` (and with it the connection) is dropped here
        });

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Minimal one-shot HTTP responder for transport tests

    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// What the responder does after writing `head` and `chunks`
    pub enum Then {
        Close,
        /// Keep the socket open and report when the client hangs up
        HoldOpen(oneshot::Sender<()>),
    }

    /// Serve a single connection. Returns the URL to hit and a receiver for
    /// the raw request text.
    pub async fn serve_once(
        head: &'static str,
        chunks: Vec<&'static str>,
        then: Then,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (req_tx, req_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = req_tx.send(request);

            socket.write_all(head.as_bytes()).await.unwrap();
            for chunk in chunks {
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            match then {
                Then::Close => {
                    let _ = socket.shutdown().await;
                }
                Then::HoldOpen(hung_up) => {
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => continue,
                        }
                    }
                    let _ = hung_up.send(());
                }
            }
        });

        (format!("http://{}/v1/chat", addr), req_rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }
}
