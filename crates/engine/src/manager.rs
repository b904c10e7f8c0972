//! Execution lifecycle manager.
//!
//! Every call to [`ExecutionManager::execute`] leaves behind exactly one
//! execution record in a terminal state. The record is written in RUNNING
//! before the agent is touched, so a crash mid-run is still visible.
//! Failures of the run itself are recorded, not returned; only a missing
//! agent or a failing store surfaces as `Err`.

use crate::runner::Runner;
use agentexec_agent::RunRequest;
use agentexec_config::ExecutionConfig;
use agentexec_core::agent::Agent;
use agentexec_core::error::{Error, Result};
use agentexec_core::event::{DomainEvent, EventBus};
use agentexec_core::execution::{Execution, ExecutionInput, ExecutionStats, ExecutionStatus, RunOutput};
use agentexec_core::store::{AgentStore, ExecutionQuery, ExecutionStore};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long a timed-out run gets to release its resources.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Paging for execution listings.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Creates, drives, cancels and reports on executions.
pub struct ExecutionManager {
    agents: Arc<dyn AgentStore>,
    executions: Arc<dyn ExecutionStore>,
    runner: Arc<dyn Runner>,
    timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
    /// Cancellation handles of runs in progress, by execution id.
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl ExecutionManager {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        executions: Arc<dyn ExecutionStore>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            agents,
            executions,
            runner,
            timeout: Duration::from_secs(300),
            event_bus: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_config(self, config: &ExecutionConfig) -> Self {
        self.with_timeout(config.timeout())
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run an agent on behalf of `user_id` and record the outcome.
    pub async fn execute(
        &self,
        agent_id: &str,
        user_id: &str,
        input: impl Into<String>,
        parameters: Map<String, Value>,
        session_id: Option<String>,
    ) -> Result<Execution> {
        let agent = self
            .agents
            .get_owned_agent(agent_id, user_id)
            .await?
            .ok_or_else(|| Error::not_found("Agent", agent_id))?;

        let input = ExecutionInput {
            input: input.into(),
            parameters,
        };
        let mut execution = Execution::start(&agent.id, user_id, input, session_id);
        self.executions.insert_execution(&execution).await?;

        info!(
            execution_id = %execution.id,
            agent_id = %agent.id,
            session_id = ?execution.session_id,
            "Agent execution started"
        );
        self.publish(DomainEvent::ExecutionStarted {
            execution_id: execution.id.clone(),
            agent_id: agent.id.clone(),
            timestamp: execution.created_at,
        });

        let registration = self.register(&execution.id);
        let request = RunRequest {
            input: execution.input.input.clone(),
            parameters: execution.input.parameters.clone(),
            session_id: execution.session_id.clone(),
            execution_id: Some(execution.id.clone()),
        };
        let outcome = self
            .drive(&agent, request, registration.token.clone())
            .await;
        drop(registration);

        let now = Utc::now();
        match outcome.and_then(|run| to_output(&run)) {
            Ok(output) => {
                execution.status = ExecutionStatus::Completed;
                execution.output = Some(output);
            }
            Err(message) => {
                execution.status = ExecutionStatus::Failed;
                execution.output = Some(json!({ "error": message }));
                execution.error_message = Some(message);
            }
        }
        execution.duration_ms = Some(execution.elapsed_ms(now));
        execution.updated_at = now;

        if !self
            .executions
            .update_execution_if(&execution, ExecutionStatus::Running)
            .await?
        {
            // Cancelled while running; the cancellation record stands
            let stored = self
                .executions
                .get_execution(&execution.id)
                .await?
                .ok_or_else(|| Error::not_found("Execution", &execution.id))?;
            info!(
                execution_id = %stored.id,
                status = %stored.status,
                "Execution ended after it was cancelled"
            );
            return Ok(stored);
        }

        match execution.status {
            ExecutionStatus::Completed => info!(
                execution_id = %execution.id,
                duration_ms = execution.duration_ms,
                "Agent execution completed"
            ),
            _ => error!(
                execution_id = %execution.id,
                error = execution.error_message.as_deref().unwrap_or_default(),
                "Agent execution failed"
            ),
        }
        self.finished(&execution);
        Ok(execution)
    }

    /// Run with the overall timeout. On expiry the run is cancelled and
    /// given a short grace period to tear down.
    async fn drive(
        &self,
        agent: &Agent,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<RunOutput, String> {
        let run = self.runner.run(agent, request, cancel.clone());
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => outcome.map_err(failure_message),
            _ = tokio::time::sleep(self.timeout) => {
                cancel.cancel();
                if tokio::time::timeout(TEARDOWN_GRACE, &mut run).await.is_err() {
                    warn!(agent_id = %agent.id, "Timed-out run did not stop within the grace period");
                }
                Err(format!("Execution timed out after {}s", self.timeout.as_secs()))
            }
        }
    }

    /// Mark a PENDING or RUNNING execution as CANCELLED and stop its run.
    pub async fn cancel(&self, execution_id: &str, user_id: &str) -> Result<Execution> {
        let mut execution = self.get_execution(execution_id, user_id).await?;
        let previous = execution.status;
        if !previous.can_transition_to(ExecutionStatus::Cancelled) {
            return Err(Error::InvalidState(format!(
                "Execution cannot be cancelled from {previous}"
            )));
        }

        let now = Utc::now();
        execution.status = ExecutionStatus::Cancelled;
        execution.duration_ms = Some(execution.elapsed_ms(now));
        execution.updated_at = now;

        if !self.executions.update_execution_if(&execution, previous).await? {
            let current = self.get_execution(execution_id, user_id).await?;
            return Err(Error::InvalidState(format!(
                "Execution cannot be cancelled from {}",
                current.status
            )));
        }

        if let Some(token) = self.lock_in_flight().get(execution_id) {
            token.cancel();
        }
        info!(execution_id = %execution_id, "Execution cancelled");
        self.finished(&execution);
        Ok(execution)
    }

    /// An execution owned by `user_id`.
    pub async fn get_execution(&self, execution_id: &str, user_id: &str) -> Result<Execution> {
        self.executions
            .get_execution(execution_id)
            .await?
            .filter(|e| e.user_id == user_id)
            .ok_or_else(|| Error::not_found("Execution", execution_id))
    }

    /// Executions of one of the user's agents, newest first.
    pub async fn list_agent_executions(
        &self,
        agent_id: &str,
        user_id: &str,
        session_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<Execution>> {
        self.agents
            .get_owned_agent(agent_id, user_id)
            .await?
            .ok_or_else(|| Error::not_found("Agent", agent_id))?;

        let query = ExecutionQuery {
            session_id: session_id.map(str::to_string),
            limit: Some(page.limit),
            offset: page.offset,
            ..ExecutionQuery::for_agent(agent_id)
        };
        Ok(self.executions.list_executions(&query).await?)
    }

    /// Totals and rates over all of the user's executions.
    pub async fn get_stats(&self, user_id: &str) -> Result<ExecutionStats> {
        let executions = self
            .executions
            .list_executions(&ExecutionQuery::for_user(user_id))
            .await?;
        Ok(ExecutionStats::from_executions(&executions))
    }

    /// Number of runs currently in progress in this process.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn register(&self, execution_id: &str) -> InFlight<'_> {
        let token = CancellationToken::new();
        self.lock_in_flight()
            .insert(execution_id.to_string(), token.clone());
        InFlight {
            manager: self,
            execution_id: execution_id.to_string(),
            token,
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finished(&self, execution: &Execution) {
        self.publish(DomainEvent::ExecutionFinished {
            execution_id: execution.id.clone(),
            status: execution.status,
            duration_ms: execution.duration_ms.unwrap_or_default(),
            timestamp: execution.updated_at,
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// A registered run. Dropping it removes the entry and cancels the token,
/// also when the caller abandons `execute` midway.
struct InFlight<'a> {
    manager: &'a ExecutionManager,
    execution_id: String,
    token: CancellationToken,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.manager.lock_in_flight().remove(&self.execution_id);
        self.token.cancel();
    }
}

fn to_output(run: &RunOutput) -> std::result::Result<Value, String> {
    serde_json::to_value(run).map_err(|e| format!("Failed to record run output: {e}"))
}

/// The message stored on a FAILED record. Loop failures carry their own
/// wording; everything else uses the error's display form.
fn failure_message(error: Error) -> String {
    match error {
        Error::ExecutionFailure(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentexec_core::agent::{AgentConfig, AgentStatus};
    use agentexec_core::error::ProviderError;
    use agentexec_store::InMemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    // ── Mock runners ─────────────────────────────────────────────────────

    struct Echo;

    #[async_trait]
    impl Runner for Echo {
        async fn run(&self, _agent: &Agent, request: RunRequest, _cancel: CancellationToken) -> Result<RunOutput> {
            Ok(RunOutput {
                output: format!("echo: {}", request.input),
                ..Default::default()
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl Runner for Broken {
        async fn run(&self, _agent: &Agent, _request: RunRequest, _cancel: CancellationToken) -> Result<RunOutput> {
            Err(ProviderError::NotConfigured("no API key".into()).into())
        }
    }

    /// Waits until cancelled, signalling once it has started.
    struct Blocking {
        started: Arc<Notify>,
        released: Arc<Notify>,
    }

    #[async_trait]
    impl Runner for Blocking {
        async fn run(&self, _agent: &Agent, _request: RunRequest, cancel: CancellationToken) -> Result<RunOutput> {
            self.started.notify_one();
            cancel.cancelled().await;
            self.released.notify_one();
            Err(Error::ExecutionFailure("Execution was cancelled".into()))
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn setup(runner: Arc<dyn Runner>) -> (ExecutionManager, InMemoryStore, Agent) {
        let store = InMemoryStore::new();
        let agent = Agent::new("u1", "Helper", AgentConfig::default());
        store.put_agent(agent.clone()).await.unwrap();
        let manager = ExecutionManager::new(Arc::new(store.clone()), Arc::new(store.clone()), runner);
        (manager, store, agent)
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn successful_run_is_completed_with_output() {
        let (manager, store, agent) = setup(Arc::new(Echo)).await;
        let exec = manager
            .execute(&agent.id, "u1", "hi", Map::new(), Some("s1".into()))
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.output_text(), Some("echo: hi"));
        assert!(exec.duration_ms.is_some());
        assert_eq!(exec.session_id.as_deref(), Some("s1"));

        let stored = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(stored.output, exec.output);
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn failing_run_is_recorded_not_raised() {
        let (manager, _store, agent) = setup(Arc::new(Broken)).await;
        let exec = manager.execute(&agent.id, "u1", "hi", Map::new(), None).await.unwrap();

        assert_eq!(exec.status, ExecutionStatus::Failed);
        let message = exec.error_message.clone().unwrap();
        assert!(message.contains("no API key"));
        assert_eq!(exec.output.unwrap()["error"], message);
    }

    #[tokio::test]
    async fn foreign_or_deleted_agents_are_not_found() {
        let (manager, store, agent) = setup(Arc::new(Echo)).await;
        let err = manager.execute(&agent.id, "intruder", "hi", Map::new(), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        store.set_agent_status(&agent.id, AgentStatus::Deleted).await.unwrap();
        let err = manager.execute(&agent.id, "u1", "hi", Map::new(), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(store.list_executions(&ExecutionQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_runs_time_out() {
        let started = Arc::new(Notify::new());
        let released = Arc::new(Notify::new());
        let runner = Arc::new(Blocking {
            started: started.clone(),
            released: released.clone(),
        });
        let (manager, _store, agent) = setup(runner).await;
        let manager = manager.with_timeout(Duration::from_secs(2));

        let exec = manager.execute(&agent.id, "u1", "hi", Map::new(), None).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some("Execution timed out after 2s"));
    }

    #[tokio::test]
    async fn cancelling_a_running_execution_stops_it() {
        let started = Arc::new(Notify::new());
        let released = Arc::new(Notify::new());
        let runner = Arc::new(Blocking {
            started: started.clone(),
            released: released.clone(),
        });
        let (manager, store, agent) = setup(runner).await;
        let manager = Arc::new(manager);

        let task = {
            let manager = manager.clone();
            let agent_id = agent.id.clone();
            tokio::spawn(async move { manager.execute(&agent_id, "u1", "hi", Map::new(), None).await })
        };
        started.notified().await;

        let running = store.list_executions(&ExecutionQuery::default()).await.unwrap();
        let cancelled = manager.cancel(&running[0].id, "u1").await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);

        released.notified().await;
        let finished = task.await.unwrap().unwrap();
        assert_eq!(finished.status, ExecutionStatus::Cancelled);
        let stored = store.get_execution(&finished.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn abandoned_execute_releases_its_slot() {
        let started = Arc::new(Notify::new());
        let released = Arc::new(Notify::new());
        let runner = Arc::new(Blocking {
            started: started.clone(),
            released: released.clone(),
        });
        let (manager, store, agent) = setup(runner).await;

        {
            let run = manager.execute(&agent.id, "u1", "hi", Map::new(), None);
            tokio::pin!(run);
            tokio::select! {
                _ = &mut run => panic!("blocking run finished"),
                _ = started.notified() => {}
            }
            assert_eq!(manager.in_flight(), 1);
        }
        assert_eq!(manager.in_flight(), 0);

        // The record is left RUNNING and can still be cancelled
        let running = store.list_executions(&ExecutionQuery::default()).await.unwrap();
        assert_eq!(running[0].status, ExecutionStatus::Running);
        let cancelled = manager.cancel(&running[0].id, "u1").await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_a_completed_execution_is_rejected() {
        let (manager, store, agent) = setup(Arc::new(Echo)).await;
        let exec = manager.execute(&agent.id, "u1", "hi", Map::new(), None).await.unwrap();

        let err = manager.cancel(&exec.id, "u1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let stored = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn executions_are_scoped_to_their_owner() {
        let (manager, _store, agent) = setup(Arc::new(Echo)).await;
        let exec = manager.execute(&agent.id, "u1", "hi", Map::new(), None).await.unwrap();

        assert!(manager.get_execution(&exec.id, "u1").await.is_ok());
        assert!(matches!(
            manager.get_execution(&exec.id, "u2").await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            manager.cancel(&exec.id, "u2").await,
            Err(Error::NotFound { .. })
        ));
        assert!(
            manager
                .list_agent_executions(&agent.id, "u2", None, Page::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn listings_filter_by_session_and_page() {
        let (manager, _store, agent) = setup(Arc::new(Echo)).await;
        for (input, session) in [("a", "s1"), ("b", "s2"), ("c", "s1")] {
            manager
                .execute(&agent.id, "u1", input, Map::new(), Some(session.into()))
                .await
                .unwrap();
        }

        let s1 = manager
            .list_agent_executions(&agent.id, "u1", Some("s1"), Page::default())
            .await
            .unwrap();
        let inputs: Vec<&str> = s1.iter().map(|e| e.input.input.as_str()).collect();
        assert_eq!(inputs, vec!["c", "a"]);

        let page = manager
            .list_agent_executions(&agent.id, "u1", None, Page { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].input.input, "b");
    }

    #[tokio::test]
    async fn stats_cover_all_user_executions() {
        let (manager, store, agent) = setup(Arc::new(Echo)).await;
        assert_eq!(manager.get_stats("u1").await.unwrap(), ExecutionStats::default());

        manager.execute(&agent.id, "u1", "a", Map::new(), None).await.unwrap();
        let broken = ExecutionManager::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(Broken),
        );
        broken.execute(&agent.id, "u1", "b", Map::new(), None).await.unwrap();

        let stats = manager.get_stats("u1").await.unwrap();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.completed_executions, 1);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(manager.get_stats("nobody").await.unwrap().total_executions, 0);
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let (manager, _store, agent) = setup(Arc::new(Echo)).await;
        let manager = manager.with_event_bus(bus);
        manager.execute(&agent.id, "u1", "hi", Map::new(), None).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap().as_ref(),
            DomainEvent::ExecutionStarted { .. }
        ));
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ExecutionFinished { status, .. } => {
                assert_eq!(*status, ExecutionStatus::Completed)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
