//! Server-Sent Events decoding and the completion stream handed to callers

use crate::error::{RagError, Result};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;
type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One decoded SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Decoder turning a vendor byte stream into SSE events.
///
/// Ends at a `data: [DONE]` sentinel or at the configured terminal event.
/// Transport end-of-stream before either is reported as a provider error, so
/// a truncated response never looks like a complete one.
pub struct SseDecoder {
    inner: Option<ByteStream>,
    buffer: Vec<u8>,
    provider: String,
    terminal_event: Option<String>,
    finished: bool,
}

impl SseDecoder {
    pub fn new<S, B>(provider: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = reqwest::Result<B>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        let bytes = stream.map(|chunk| chunk.map(|b| b.as_ref().to_vec()));
        Self {
            inner: Some(Box::pin(bytes)),
            buffer: Vec::new(),
            provider: provider.into(),
            terminal_event: None,
            finished: false,
        }
    }

    /// Treat an event with this `event:` name as the end of the stream
    pub fn with_terminal_event(mut self, name: impl Into<String>) -> Self {
        self.terminal_event = Some(name.into());
        self
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied().filter(|&b| b != b'\r'));
    }

    /// Next complete block. Blocks split on a blank line, which never falls
    /// inside a multi-byte character, so decoding a whole block is lossless.
    fn next_block(&mut self) -> Option<String> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let block = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + 2);
        Some(block)
    }

    /// Parse one blank-line-delimited block. `None` for comments and keepalives.
    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut event = None;
        let mut data: Vec<&str> = Vec::new();

        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "event" => event = Some(value.to_string()),
                "data" => data.push(value),
                _ => {}
            }
        }

        if data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: data.join("\n"),
        })
    }

    fn is_terminal(&self, event: &SseEvent) -> bool {
        event.data.trim() == "[DONE]"
            || (event.event.is_some() && event.event == self.terminal_event)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.inner = None;
        self.buffer.clear();
    }

    /// Returns `Some(None)` at the end of the stream
    fn take_event(&mut self, block: &str) -> Option<Option<SseEvent>> {
        let parsed = Self::parse_block(block)?;
        if self.is_terminal(&parsed) {
            self.finish();
            return Some(None);
        }
        Some(Some(parsed))
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            while let Some(block) = this.next_block() {
                match this.take_event(&block) {
                    Some(Some(event)) => return Poll::Ready(Some(Ok(event))),
                    Some(None) => return Poll::Ready(None),
                    None => continue,
                }
            }

            let Some(inner) = this.inner.as_mut() else {
                // Transport ended; flush a trailing block without its blank line
                let rest = std::mem::take(&mut this.buffer);
                let rest = String::from_utf8_lossy(&rest);
                if !rest.trim().is_empty() {
                    match this.take_event(&rest) {
                        Some(Some(event)) => return Poll::Ready(Some(Ok(event))),
                        Some(None) => return Poll::Ready(None),
                        None => {}
                    }
                }
                this.finish();
                return Poll::Ready(Some(Err(RagError::provider(
                    &this.provider,
                    crate::error::GENERIC_PROVIDER_STATUS,
                    "stream ended before the response was complete",
                ))));
            };

            match inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.push_bytes(&bytes),
                Poll::Ready(Some(Err(err))) => {
                    this.finish();
                    return Poll::Ready(Some(Err(crate::http::transport_error(
                        &this.provider,
                        err,
                    ))));
                }
                Poll::Ready(None) => this.inner = None,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Lazy, finite, non-restartable sequence of completion text fragments.
///
/// The underlying transport is released when the stream finishes, yields an
/// error, is [closed](CompletionStream::close) or is dropped. After an error
/// the stream yields nothing further.
pub struct CompletionStream {
    inner: Option<FragmentStream>,
    provider: String,
    model: String,
}

impl CompletionStream {
    pub fn new<S>(provider: impl Into<String>, model: impl Into<String>, fragments: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(fragments)),
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Abort consumption and release the transport
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(provider = %self.provider, "completion stream closed early");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the stream into one string, failing on the first error
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for CompletionStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(err))) => {
                this.inner = None;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Map decoded events to text fragments with a vendor-specific extractor.
///
/// The extractor returns `Ok(None)` for events carrying no text.
pub(crate) fn fragments<F>(
    decoder: SseDecoder,
    extract: F,
) -> impl Stream<Item = Result<String>> + Send
where
    F: Fn(&SseEvent) -> Result<Option<String>> + Send + 'static,
{
    decoder.filter_map(move |event| {
        let item = match event {
            Ok(event) => extract(&event).transpose(),
            Err(err) => Some(Err(err)),
        };
        futures::future::ready(item)
    })
}

/// Parse an event payload as JSON, mapping failures to a provider error
pub(crate) fn event_json(provider: &str, event: &SseEvent) -> Result<serde_json::Value> {
    serde_json::from_str(&event.data).map_err(|e| {
        RagError::provider(
            provider,
            crate::error::GENERIC_PROVIDER_STATUS,
            format!("malformed stream event: {}", e),
        )
    })
}
