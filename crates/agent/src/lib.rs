//! The agent loop — one blocking round-trip per user turn.
//!
//! The loop forwards the conversation plus static system instructions to the
//! provider, granting the model the option to invoke the declared tools zero
//! or more times before producing a final textual answer. There is no
//! concurrency here: each `process` call runs to completion before the caller
//! proceeds.

use std::sync::Arc;
use tracing::{debug, info, warn};
use websage_core::message::{Conversation, Message, Role};
use websage_core::provider::{Provider, ProviderRequest};
use websage_core::tool::{ToolCall, ToolRegistry};

/// Returned when the model produced no textual output.
pub const NO_RESPONSE: &str = "No response.";

/// Default system instructions for the assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the web_search tool \
     if a question requires current or external information. Cite your sources when using \
     search results.";

/// The agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Static system instructions
    system_prompt: String,

    /// Maximum tool call iterations per turn
    max_iterations: u32,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations: 10,
        }
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Process the conversation's latest user message and generate a response.
    ///
    /// 1. Ensures the system instructions are the first message
    /// 2. Calls the LLM with the registry's tool definitions attached
    /// 3. If tool calls come back, executes them and loops
    /// 4. Appends and returns the final text response
    ///
    /// Provider errors propagate untouched — there is no retry here.
    pub async fn process(
        &self,
        conversation: &mut Conversation,
    ) -> Result<String, websage_core::Error> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Processing conversation"
        );

        if conversation.messages.is_empty() || conversation.messages[0].role != Role::System {
            conversation
                .messages
                .insert(0, Message::system(&self.system_prompt));
        }

        let tool_definitions = self.tools.definitions();
        let mut iteration = 0;

        loop {
            iteration += 1;

            if iteration > self.max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    "Max tool iterations reached, giving up on a final answer"
                );
                break;
            }

            debug!(
                conversation_id = %conversation.id,
                iteration = iteration,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                debug!(
                    model = %response.model,
                    tokens = usage.total_tokens,
                    "Completion finished"
                );
            }

            if response.message.tool_calls.is_empty() {
                // No tool calls — this is the final text response.
                let text = response.message.content.clone();
                conversation.push(response.message);

                if text.trim().is_empty() {
                    return Ok(NO_RESPONSE.into());
                }
                return Ok(text);
            }

            // The model wants tools — execute each call and feed the results back.
            debug!(
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );

            let tool_calls = response.message.tool_calls.clone();
            conversation.push(response.message);

            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                match self.tools.execute(&call).await {
                    Ok(result) => {
                        debug!(tool = %tc.name, success = result.success, "Tool executed");
                        conversation.push(Message::tool_result(&tc.id, &result.output));
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");
                        // Report the error to the model so it can recover.
                        conversation.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }
        }

        Ok(NO_RESPONSE.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use websage_core::error::{ProviderError, ToolError};
    use websage_core::message::MessageToolCall;
    use websage_core::provider::{ProviderResponse, Usage};
    use websage_core::tool::{Tool, ToolResult};

    /// A provider that replays a fixed sequence of responses.
    struct ScriptedProvider {
        responses: Vec<Message>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let message = self
                .responses
                .get(i)
                .cloned()
                .unwrap_or_else(|| Message::assistant("out of script"));
            Ok(ProviderResponse {
                message,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    /// A tool that records invocations and returns a canned digest.
    struct StubSearchTool;

    #[async_trait]
    impl Tool for StubSearchTool {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let query = arguments["query"].as_str().unwrap_or("");
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: format!("Search results for '{query}':\n\n1. **stub**\n"),
            })
        }
    }

    fn registry_with_stub() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubSearchTool));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant(
            "Hello! How can I help?",
        )]));
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.1,
            Arc::new(ToolRegistry::new()),
            DEFAULT_SYSTEM_PROMPT,
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("Hello!"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "Hello! How can I help?");
        // System + User + Assistant = 3 messages
        assert_eq!(conv.messages.len(), 3);
        assert_eq!(conv.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn tool_call_round_trip() {
        let mut tool_call_msg = Message::assistant("");
        tool_call_msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "web_search".into(),
            arguments: r#"{"query": "rust"}"#.into(),
        }];

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_msg,
            Message::assistant("Rust is a systems language (source: stub)."),
        ]));
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.1,
            registry_with_stub(),
            DEFAULT_SYSTEM_PROMPT,
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("What is rust?"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "Rust is a systems language (source: stub).");

        // System, user, assistant(tool_calls), tool result, final assistant
        assert_eq!(conv.messages.len(), 5);
        assert_eq!(conv.messages[3].role, Role::Tool);
        assert!(conv.messages[3].content.contains("Search results for 'rust'"));
        assert_eq!(conv.messages[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn unknown_tool_reported_to_model() {
        let mut tool_call_msg = Message::assistant("");
        tool_call_msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "no_such_tool".into(),
            arguments: "{}".into(),
        }];

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_msg,
            Message::assistant("I could not use that tool."),
        ]));
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.1,
            Arc::new(ToolRegistry::new()),
            DEFAULT_SYSTEM_PROMPT,
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("hi"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "I could not use that tool.");
        assert!(conv.messages[3].content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn empty_model_output_falls_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("  ")]));
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.1,
            Arc::new(ToolRegistry::new()),
            DEFAULT_SYSTEM_PROMPT,
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("say nothing"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, NO_RESPONSE);
    }

    #[tokio::test]
    async fn max_iterations_caps_tool_loops() {
        // A provider that requests a tool call on every round.
        struct LoopingProvider;

        #[async_trait]
        impl Provider for LoopingProvider {
            fn name(&self) -> &str {
                "looping"
            }
            async fn complete(
                &self,
                _request: ProviderRequest,
            ) -> Result<ProviderResponse, ProviderError> {
                let mut msg = Message::assistant("");
                msg.tool_calls = vec![MessageToolCall {
                    id: "call_n".into(),
                    name: "web_search".into(),
                    arguments: r#"{"query": "again"}"#.into(),
                }];
                Ok(ProviderResponse {
                    message: msg,
                    usage: None,
                    model: "mock-model".into(),
                })
            }
        }

        let agent = AgentLoop::new(
            Arc::new(LoopingProvider),
            "mock-model",
            0.1,
            registry_with_stub(),
            DEFAULT_SYSTEM_PROMPT,
        )
        .with_max_iterations(3);

        let mut conv = Conversation::new();
        conv.push(Message::user("loop forever"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, NO_RESPONSE);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        struct FailingProvider;

        #[async_trait]
        impl Provider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }
            async fn complete(
                &self,
                _request: ProviderRequest,
            ) -> Result<ProviderResponse, ProviderError> {
                Err(ProviderError::Network("connection reset".into()))
            }
        }

        let agent = AgentLoop::new(
            Arc::new(FailingProvider),
            "mock-model",
            0.1,
            Arc::new(ToolRegistry::new()),
            DEFAULT_SYSTEM_PROMPT,
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("hi"));

        let err = agent.process(&mut conv).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn system_prompt_inserted_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Message::assistant("first"),
            Message::assistant("second"),
        ]));
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.1,
            Arc::new(ToolRegistry::new()),
            "custom instructions",
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("one"));
        agent.process(&mut conv).await.unwrap();
        conv.push(Message::user("two"));
        agent.process(&mut conv).await.unwrap();

        let system_count = conv
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(conv.messages[0].content, "custom instructions");
    }
}
