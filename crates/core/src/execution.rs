//! Execution records and their state machine.
//!
//! `PENDING → RUNNING → {COMPLETED | FAILED | CANCELLED}`. PENDING is
//! transient; CANCELLED is only reachable from PENDING or RUNNING.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's request: raw text plus free-form parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    pub input: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// One tool observation recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStep {
    pub tool: String,
    pub observation: String,
    pub call_id: String,
}

/// What a reasoning-loop run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub output: String,
    #[serde(default)]
    pub intermediate_steps: Vec<IntermediateStep>,
    /// Name-deduplicated, insertion-ordered.
    #[serde(default)]
    pub tools_used: Vec<String>,
    /// Wall-clock seconds spent in the loop.
    #[serde(default)]
    pub execution_time: f64,
}

impl RunOutput {
    /// Record a tool observation, keeping `tools_used` unique and ordered.
    pub fn record_step(&mut self, step: IntermediateStep) {
        if !self.tools_used.iter().any(|t| t == &step.tool) {
            self.tools_used.push(step.tool.clone());
        }
        self.intermediate_steps.push(step);
    }
}

/// One recorded invocation of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub input: ExecutionInput,
    /// `RunOutput` on success, `{"error": ...}` on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// A fresh record in RUNNING (PENDING is advanced immediately).
    pub fn start(
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        input: ExecutionInput,
        session_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            input,
            output: None,
            session_id,
            status: ExecutionStatus::Running,
            duration_ms: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole milliseconds between creation and `now`.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds().max(0)
    }

    /// The final answer text, if this execution completed with one.
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_ref()?.get("output")?.as_str()
    }
}

/// Aggregates over one user's executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub completed_executions: u64,
    pub failed_executions: u64,
    /// Completed over total, in `0.0..=1.0`; 0 when there are no executions.
    pub success_rate: f64,
    /// Executions without a recorded duration count as zero.
    pub average_duration_ms: f64,
}

impl ExecutionStats {
    pub fn from_executions<'a>(executions: impl IntoIterator<Item = &'a Execution>) -> Self {
        let mut stats = Self::default();
        let mut duration_sum = 0i64;
        for exec in executions {
            stats.total_executions += 1;
            match exec.status {
                ExecutionStatus::Completed => stats.completed_executions += 1,
                ExecutionStatus::Failed => stats.failed_executions += 1,
                _ => {}
            }
            duration_sum += exec.duration_ms.unwrap_or(0);
        }
        if stats.total_executions > 0 {
            let total = stats.total_executions as f64;
            stats.success_rate = stats.completed_executions as f64 / total;
            stats.average_duration_ms = duration_sum as f64 / total;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_no_transitions() {
        use ExecutionStatus::*;
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Running.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn record_step_dedupes_tools_in_order() {
        let mut out = RunOutput::default();
        for (tool, id) in [("gmail", "1"), ("csv", "2"), ("gmail", "3")] {
            out.record_step(IntermediateStep {
                tool: tool.into(),
                observation: "ok".into(),
                call_id: id.into(),
            });
        }
        assert_eq!(out.tools_used, vec!["gmail", "csv"]);
        assert_eq!(out.intermediate_steps.len(), 3);
    }

    #[test]
    fn stats_of_nothing_are_zero() {
        let stats = ExecutionStats::from_executions(&[]);
        assert_eq!(stats.total_executions, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_duration_ms, 0.0);
    }

    #[test]
    fn stats_aggregate_status_and_duration() {
        let mut a = Execution::start("a", "u", ExecutionInput::default(), None);
        a.status = ExecutionStatus::Completed;
        a.duration_ms = Some(100);
        let mut b = Execution::start("a", "u", ExecutionInput::default(), None);
        b.status = ExecutionStatus::Failed;
        b.duration_ms = Some(300);
        let c = Execution::start("a", "u", ExecutionInput::default(), None);

        let stats = ExecutionStats::from_executions(&[a, b, c]);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.completed_executions, 1);
        assert_eq!(stats.failed_executions, 1);
        assert!((stats.success_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((stats.average_duration_ms - 400.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn output_text_reads_nested_field() {
        let mut exec = Execution::start("a", "u", ExecutionInput::default(), None);
        assert_eq!(exec.output_text(), None);
        exec.output = Some(serde_json::json!({"output": "hi"}));
        assert_eq!(exec.output_text(), Some("hi"));
    }
}
