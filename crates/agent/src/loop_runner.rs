//! The reasoning loop: model call, tool calls, observations, repeat.

use crate::invoker::ToolInvoker;
use agentexec_core::error::Error;
use agentexec_core::event::{DomainEvent, EventBus};
use agentexec_core::execution::{IntermediateStep, RunOutput};
use agentexec_core::message::Message;
use agentexec_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives one tool-calling conversation with the model.
///
/// Each step is one model call. A response without tool calls ends the run;
/// otherwise every requested tool is invoked in order and its observation
/// fed back before the next step. Running out of steps is an error, as is
/// cancellation.
pub struct ReasoningLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    /// Per-agent key; `None` lets the provider use its own
    api_key: Option<String>,

    /// Maximum model calls per run
    max_steps: u32,

    invoker: ToolInvoker,

    event_bus: Option<Arc<EventBus>>,

    cancel: CancellationToken,
}

impl ReasoningLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, invoker: ToolInvoker) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            api_key: None,
            max_steps: 25,
            invoker,
            event_bus: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Set the step budget. Zero is treated as one.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run to a final answer.
    ///
    /// `history` is replayed between the system prompt and `input`.
    pub async fn run(
        &self,
        system_prompt: &str,
        history: Vec<Message>,
        input: &str,
    ) -> Result<RunOutput, Error> {
        let started = Instant::now();
        let tool_definitions = self.invoker.tools().definitions();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history);
        messages.push(Message::user(input));

        let mut output = RunOutput::default();

        for step in 1..=self.max_steps {
            debug!(step, model = %self.model, messages = messages.len(), "Reasoning loop step");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
                api_key: self.api_key.clone(),
            };
            let response = self.complete(request).await?;

            if let (Some(usage), Some(bus)) = (&response.usage, &self.event_bus) {
                bus.publish(DomainEvent::ResponseGenerated {
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: chrono::Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                output.output = response.message.content;
                output.execution_time = started.elapsed().as_secs_f64();
                info!(
                    steps = step,
                    tools_used = ?output.tools_used,
                    "Reasoning loop finished"
                );
                return Ok(output);
            }

            let tool_calls = response.message.tool_calls.clone();
            debug!(tool_count = tool_calls.len(), "Executing tool calls");
            messages.push(response.message);

            for call in &tool_calls {
                let invocation = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(cancelled()),
                    invocation = self.invoker.invoke(call) => invocation,
                };
                messages.push(Message::tool_result(&call.id, &invocation.observation));
                output.record_step(IntermediateStep {
                    tool: invocation.tool,
                    observation: invocation.observation,
                    call_id: invocation.call_id,
                });
            }
        }

        warn!(max_steps = self.max_steps, "Step budget exhausted before a final answer");
        Err(Error::ExecutionFailure(format!(
            "Agent stopped after {} steps without a final answer",
            self.max_steps
        )))
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, Error> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(cancelled()),
            response = self.provider.complete(request) => Ok(response?),
        }
    }
}

fn cancelled() -> Error {
    Error::ExecutionFailure("Execution was cancelled".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentexec_core::error::{ProviderError, ToolError};
    use agentexec_core::message::{MessageToolCall, Role};
    use agentexec_core::provider::Usage;
    use agentexec_core::tool::{Tool, ToolContext, ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// A provider that replays a fixed script and records what it was sent.
    struct ScriptedProvider {
        script: Mutex<Vec<Message>>,
        seen: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(mut script: Vec<Message>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            let message = self
                .script
                .lock()
                .unwrap()
                .pop()
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

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercases text"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }
        async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text(
                arguments["text"].as_str().unwrap_or_default().to_uppercase(),
            ))
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> Message {
        Message::assistant("").with_tool_calls(vec![MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }])
    }

    fn invoker() -> ToolInvoker {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Upper));
        ToolInvoker::new(tools, ToolContext::new("u1", "a1"))
    }

    #[tokio::test]
    async fn direct_answer_uses_no_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("Hello!")]));
        let run = ReasoningLoop::new(provider.clone(), "mock-model", invoker())
            .run("Be nice.", vec![Message::user("earlier"), Message::assistant("reply")], "Hi")
            .await
            .unwrap();

        assert_eq!(run.output, "Hello!");
        assert!(run.tools_used.is_empty());
        assert!(run.execution_time >= 0.0);

        let sent = &provider.requests()[0];
        let roles: Vec<Role> = sent.messages.iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(sent.messages[0].content, "Be nice.");
        assert_eq!(sent.tools.len(), 1);
    }

    #[tokio::test]
    async fn observations_are_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call("c1", "upper", r#"{"text": "abc"}"#),
            tool_call("c2", "upper", "not json at all"),
            tool_call("c3", "upper", r#"{"text": "xyz"}"#),
            Message::assistant("ABC and XYZ"),
        ]));
        let run = ReasoningLoop::new(provider.clone(), "mock-model", invoker())
            .run("", vec![], "shout")
            .await
            .unwrap();

        assert_eq!(run.output, "ABC and XYZ");
        assert_eq!(run.tools_used, vec!["upper"]);
        assert_eq!(run.intermediate_steps.len(), 3);
        assert_eq!(run.intermediate_steps[0].call_id, "c1");
        assert!(run.intermediate_steps[0].observation.contains("ABC"));
        assert!(run.intermediate_steps[1].observation.contains("Invalid JSON input"));

        let last = provider.requests().pop().unwrap();
        let tool_messages: Vec<&Message> =
            last.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 3);
        assert_eq!(tool_messages[2].tool_call_id.as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn step_budget_is_enforced() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call("c1", "upper", r#"{"text": "a"}"#),
            tool_call("c2", "upper", r#"{"text": "b"}"#),
            Message::assistant("never reached"),
        ]));
        let err = ReasoningLoop::new(provider.clone(), "mock-model", invoker())
            .with_max_steps(2)
            .run("", vec![], "go")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("after 2 steps"));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_loop_makes_no_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("late")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ReasoningLoop::new(provider.clone(), "mock-model", invoker())
            .with_cancellation(cancel)
            .run("", vec![], "go")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("cancelled"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn request_carries_model_settings() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("ok")]));
        ReasoningLoop::new(provider.clone(), "gpt-4o", invoker())
            .with_temperature(0.2)
            .with_max_tokens(64)
            .with_api_key(Some("sk-agent".into()))
            .run("", vec![], "go")
            .await
            .unwrap();

        let sent = &provider.requests()[0];
        assert_eq!(sent.model, "gpt-4o");
        assert_eq!(sent.temperature, 0.2);
        assert_eq!(sent.max_tokens, Some(64));
        assert_eq!(sent.api_key.as_deref(), Some("sk-agent"));
    }

    #[tokio::test]
    async fn usage_is_published() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("ok")]));
        ReasoningLoop::new(provider, "mock-model", invoker())
            .with_event_bus(bus)
            .run("", vec![], "go")
            .await
            .unwrap();

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ResponseGenerated { tokens_used, .. } => assert_eq!(*tokens_used, 15),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
