//! Language model integration
//!
//! Provides the [`ModelClient`] contract, one adapter per vendor and the
//! [`ModelRouter`] that picks between them:
//! - OpenAI chat completions
//! - Anthropic messages
//! - Server-Sent Events streaming with explicit close
//! - Blocking facade over the async clients

mod anthropic;
mod blocking;
mod openai;
mod router;
mod stream;
mod traits;
mod types;

pub use anthropic::AnthropicClient;
pub use blocking::{BlockingClient, BlockingStream};
pub use openai::OpenAiClient;
pub use router::{ModelRouter, Provider};
pub use stream::{CompletionStream, SseDecoder, SseEvent};
pub use traits::ModelClient;
pub use types::*;
