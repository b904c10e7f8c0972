//! Wiring shared by the commands: store, provider, tools, runner, manager.

use agentexec_agent::{AgentRunner, ContextAssembler, RunDefaults};
use agentexec_config::AppConfig;
use agentexec_core::event::{DomainEvent, EventBus};
use agentexec_core::tool::ToolRegistry;
use agentexec_credentials::{CredentialService, GoogleOAuthClient};
use agentexec_engine::ExecutionManager;
use agentexec_remote::RemoteSettings;
use agentexec_store::{NoopRetrieval, SqliteStore};
use agentexec_tools::files::FileRoot;
use agentexec_tools::google::GoogleApi;
use agentexec_tools::{BuiltinDeps, builtin_registry};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

pub struct App {
    pub store: SqliteStore,
    pub manager: ExecutionManager,
}

impl App {
    pub async fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let store = open_store(config).await?;
        let event_bus = Arc::new(EventBus::default());
        spawn_event_logger(&event_bus);

        let provider = agentexec_providers::build_from_config(&config.llm);
        let builtins = builtin_tools(config, &store);
        let assembler = ContextAssembler::new(Arc::new(NoopRetrieval), Arc::new(store.clone()))
            .with_top_k(config.execution.retrieval_top_k)
            .with_history_limit(config.execution.history_limit);

        let runner = AgentRunner::new(provider, builtins, assembler)
            .with_defaults(RunDefaults::from(config))
            .with_remote_settings(RemoteSettings::from(config))
            .with_event_bus(event_bus.clone());

        let manager = ExecutionManager::new(Arc::new(store.clone()), Arc::new(store.clone()), Arc::new(runner))
            .with_config(&config.execution)
            .with_event_bus(event_bus);

        Ok(Self { store, manager })
    }
}

pub async fn open_store(config: &AppConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::new(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))
}

/// The built-in tools, backed by the store's credentials.
pub fn builtin_tools(config: &AppConfig, store: &SqliteStore) -> ToolRegistry {
    let mut credentials = CredentialService::new(Arc::new(store.clone()));
    match GoogleOAuthClient::from_config(&config.google) {
        Some(client) => credentials = credentials.with_refresher(Arc::new(client)),
        None => debug!("Google OAuth client not configured; expired tokens will not be refreshed"),
    }

    let files = match &config.files.root {
        Some(root) => FileRoot::confined(root.clone()),
        None => FileRoot::unrestricted(),
    };

    builtin_registry(BuiltinDeps {
        google: GoogleApi::new(Arc::new(credentials)),
        files,
    })
}

fn spawn_event_logger(bus: &EventBus) {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ExecutionStarted { execution_id, agent_id, .. } => {
            debug!(%execution_id, %agent_id, "event: execution started");
        }
        DomainEvent::ToolExecuted {
            execution_id,
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            debug!(?execution_id, tool = %tool_name, success, duration_ms, "event: tool executed");
        }
        DomainEvent::ResponseGenerated { model, tokens_used, .. } => {
            debug!(%model, tokens_used, "event: response generated");
        }
        DomainEvent::ExecutionFinished {
            execution_id,
            status,
            duration_ms,
            ..
        } => {
            debug!(%execution_id, status = status.as_str(), duration_ms, "event: execution finished");
        }
    }
}
