//! LLM integration for search-forge.
//!
//! Every stage of the pipeline talks to the completion oracle through the
//! [`LlmProvider`] trait. The production implementation is [`OpenAiClient`],
//! which speaks the OpenAI Responses API (structured JSON mode and the hosted
//! web search tool) and can persist every raw payload through a
//! [`ResponseRecorder`].
//!
//! ```ignore
//! use search_forge::llm::{GenerationRequest, LlmProvider, Message, OpenAiClient, Tool};
//!
//! let client = OpenAiClient::from_env()?;
//! let request = GenerationRequest::new(
//!     "gpt-5-mini-2025-08-07",
//!     vec![Message::user("Find robotics companies in Boston")],
//! )
//! .with_json_response()
//! .with_tool(Tool::web_search())
//! .with_step("web_g0001");
//! let response = client.generate(request).await?;
//! println!("{}", response.text);
//! ```

pub mod models;
pub mod openai;
pub mod recorder;

pub use models::{ModelRegistry, DEFAULT_MODEL};
pub use openai::{
    extract_output_text, GenerationRequest, GenerationResponse, LlmProvider, Message,
    OpenAiClient, ResponseFormat, Tool, DEFAULT_API_BASE,
};
pub use recorder::ResponseRecorder;

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted oracle shared by unit tests across modules.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{GenerationRequest, GenerationResponse, LlmProvider};
    use crate::error::LlmError;

    type Handler =
        Box<dyn Fn(&GenerationRequest) -> Result<GenerationResponse, LlmError> + Send + Sync>;

    /// Mock LLM provider answering through a closure and logging every request.
    pub(crate) struct ScriptedLlm {
        handler: Handler,
        calls: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(
            handler: impl Fn(&GenerationRequest) -> Result<GenerationResponse, LlmError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Always answers with the same text.
        pub(crate) fn constant(text: &str) -> Self {
            let text = text.to_string();
            Self::new(move |_| Ok(GenerationResponse::from_text(text.clone())))
        }

        pub(crate) fn calls(&self) -> Vec<GenerationRequest> {
            self.calls.lock().expect("lock not poisoned").clone()
        }

        pub(crate) fn count_steps(&self, prefix: &str) -> usize {
            self.calls()
                .iter()
                .filter(|request| request.step.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            let result = (self.handler)(&request);
            self.calls.lock().expect("lock not poisoned").push(request);
            result
        }
    }
}
