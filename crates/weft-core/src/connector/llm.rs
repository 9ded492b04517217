//! LlmConnector trait and its object-safe wrapper.
//!
//! `LlmConnector` uses RPITIT (return-position `impl Trait` in traits) for
//! `chat`, consistent with the repository traits. Since RPITIT traits are not
//! object-safe, `BoxLlmConnector` provides dynamic dispatch via the usual
//! three-step pattern:
//! 1. Define an object-safe `LlmConnectorDyn` trait with boxed futures
//! 2. Blanket-impl `LlmConnectorDyn` for all `T: LlmConnector`
//! 3. `BoxLlmConnector` wraps `Box<dyn LlmConnectorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use weft_types::llm::{ChatRequest, ChatResponse, LlmError};

/// Trait for LLM connector backends.
pub trait LlmConnector: Send + Sync {
    /// Human-readable connector name (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Send a chat completion request and receive the full response.
    fn chat(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;
}

/// Object-safe version of [`LlmConnector`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch; a blanket
/// implementation is provided for all types implementing `LlmConnector`.
pub trait LlmConnectorDyn: Send + Sync {
    fn name(&self) -> &str;

    fn chat_boxed<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, LlmError>> + Send + 'a>>;
}

impl<T: LlmConnector> LlmConnectorDyn for T {
    fn name(&self) -> &str {
        LlmConnector::name(self)
    }

    fn chat_boxed<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.chat(request))
    }
}

/// Type-erased LLM connector for runtime lookup by id.
pub struct BoxLlmConnector {
    inner: Box<dyn LlmConnectorDyn + Send + Sync>,
}

impl BoxLlmConnector {
    /// Wrap a concrete `LlmConnector` in a type-erased box.
    pub fn new<T: LlmConnector + 'static>(connector: T) -> Self {
        Self {
            inner: Box::new(connector),
        }
    }

    /// Human-readable connector name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Send a chat completion request and receive the full response.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.inner.chat_boxed(request).await
    }
}
