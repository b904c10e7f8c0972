//! One full agent run: tools, context, prompt, loop, teardown.

use crate::context::{ContextAssembler, compose_system_prompt, history_messages};
use crate::invoker::ToolInvoker;
use crate::loop_runner::ReasoningLoop;
use crate::toolset::{assemble_toolset, remote_filter};
use agentexec_config::AppConfig;
use agentexec_core::agent::Agent;
use agentexec_core::error::Error;
use agentexec_core::event::EventBus;
use agentexec_core::execution::RunOutput;
use agentexec_core::provider::Provider;
use agentexec_core::tool::{ToolContext, ToolRegistry};
use agentexec_remote::{RemoteSettings, RemoteToolkit};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Inputs of one run beyond the agent itself.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub input: String,
    pub parameters: Map<String, Value>,
    pub session_id: Option<String>,
    /// Set when the run backs a recorded execution.
    pub execution_id: Option<String>,
}

/// Model defaults applied when an agent leaves a setting unset.
#[derive(Debug, Clone)]
pub struct RunDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_steps: u32,
    pub max_steps_ceiling: u32,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 1000,
            max_steps: 25,
            max_steps_ceiling: 50,
        }
    }
}

impl From<&AppConfig> for RunDefaults {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.llm.default_model.clone(),
            temperature: config.llm.default_temperature,
            max_tokens: config.llm.default_max_tokens,
            max_steps: config.execution.default_max_steps,
            max_steps_ceiling: config.execution.max_steps_ceiling,
        }
    }
}

/// Pick the step budget from caller parameters.
///
/// `max_steps` (or its alias `max_iterations`) may be a number or a numeric
/// string. Missing or unusable values fall back to `default`; everything is
/// clamped to `1..=ceiling`.
pub fn resolve_max_steps(parameters: &Map<String, Value>, default: u32, ceiling: u32) -> u32 {
    let requested = ["max_steps", "max_iterations"]
        .iter()
        .filter_map(|key| parameters.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        });
    let steps = requested
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(default);
    steps.clamp(1, ceiling.max(1))
}

/// Everything needed to run any agent; shared across executions.
pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    builtins: ToolRegistry,
    assembler: ContextAssembler,
    remote: RemoteSettings,
    defaults: RunDefaults,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn Provider>, builtins: ToolRegistry, assembler: ContextAssembler) -> Self {
        Self {
            provider,
            builtins,
            assembler,
            remote: RemoteSettings::default(),
            defaults: RunDefaults::default(),
            event_bus: None,
        }
    }

    pub fn with_remote_settings(mut self, remote: RemoteSettings) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_defaults(mut self, defaults: RunDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn builtins(&self) -> &ToolRegistry {
        &self.builtins
    }

    /// Run `agent` on `request` to a final answer.
    ///
    /// Remote tool servers are connected for this run only and are always
    /// shut down before returning, whatever the outcome.
    pub async fn run(
        &self,
        agent: &Agent,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutput, Error> {
        let toolkit = RemoteToolkit::connect(
            &agent.config.mcp_servers,
            &remote_filter(agent),
            &self.remote,
        )
        .await;
        for failure in toolkit.failures() {
            warn!(agent_id = %agent.id, error = %failure, "Remote tools unavailable for this run");
        }

        let outcome = self.run_with_tools(agent, request, cancel, &toolkit).await;
        toolkit.shutdown().await;
        outcome
    }

    async fn run_with_tools(
        &self,
        agent: &Agent,
        request: RunRequest,
        cancel: CancellationToken,
        toolkit: &RemoteToolkit,
    ) -> Result<RunOutput, Error> {
        let tools = assemble_toolset(&self.builtins, agent, toolkit.tools());
        let tool_names: Vec<String> = tools.names().into_iter().map(str::to_string).collect();

        let history = self
            .assembler
            .history(&agent.id, request.session_id.as_deref())
            .await?;
        let retrieved = self.assembler.retrieve_context(&agent.id, &request.input).await;
        let system_prompt = compose_system_prompt(&agent.base_prompt(), &tool_names, &retrieved);

        let llm = &agent.config.llm;
        let model = llm.model.clone().unwrap_or_else(|| self.defaults.model.clone());
        let max_steps = resolve_max_steps(
            &request.parameters,
            self.defaults.max_steps,
            self.defaults.max_steps_ceiling,
        );

        info!(
            agent_id = %agent.id,
            model = %model,
            tools = tool_names.len(),
            history_turns = history.len(),
            max_steps,
            "Running agent"
        );

        let mut ctx = ToolContext::new(&agent.user_id, &agent.id);
        ctx.execution_id = request.execution_id.clone();
        let mut invoker = ToolInvoker::new(tools, ctx);
        if let Some(bus) = &self.event_bus {
            invoker = invoker.with_event_bus(bus.clone());
        }

        let mut reasoning = ReasoningLoop::new(self.provider.clone(), model, invoker)
            .with_temperature(llm.temperature.unwrap_or(self.defaults.temperature))
            .with_max_tokens(llm.max_tokens.unwrap_or(self.defaults.max_tokens))
            .with_api_key(llm.api_key.clone().filter(|k| !k.trim().is_empty()))
            .with_max_steps(max_steps)
            .with_cancellation(cancel);
        if let Some(bus) = &self.event_bus {
            reasoning = reasoning.with_event_bus(bus.clone());
        }

        reasoning
            .run(&system_prompt, history_messages(&history), &request.input)
            .await
    }
}
