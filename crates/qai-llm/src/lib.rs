//! qai-llm: provider adapters and streaming transport for chat endpoints
//!
//! Provides:
//! - The provider table (endpoints, auth schemes, request shapes)
//! - Vendor request building with deterministic JSON bodies
//! - SSE / NDJSON chunk decoding into uniform text deltas
//! - A cancellable streaming HTTP transport
//! - The `ChatBackend` trait and its HTTP implementation

pub mod adapter;
pub mod client;
pub mod decoder;
pub mod error;
pub mod message;
pub mod provider;
pub mod transport;

pub use adapter::{build_request, HttpRequest};
pub use client::{ChatBackend, ChatClient, DeltaStream, LocalModel};
pub use decoder::{ChunkDecoder, Delta};
pub use error::LlmError;
pub use message::{ChatMessage, Role};
pub use provider::{AuthScheme, ProviderConfig, ProviderId, RequestShape};
pub use transport::{ChunkStream, StreamTransport, TransportConfig};
