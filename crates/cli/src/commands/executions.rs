//! `agentexec executions`, `agentexec stats`, `agentexec cancel`.

use crate::app::App;
use agentexec_config::AppConfig;
use agentexec_core::execution::Execution;
use agentexec_engine::Page;

pub async fn list(
    config: &AppConfig,
    user_id: &str,
    agent_id: &str,
    session_id: Option<&str>,
    limit: usize,
    offset: usize,
) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    let executions = app
        .manager
        .list_agent_executions(agent_id, user_id, session_id, Page { limit, offset })
        .await?;

    if executions.is_empty() {
        println!("No executions recorded for agent {agent_id}");
        return Ok(());
    }
    for execution in &executions {
        println!("{}", summary(execution));
    }
    Ok(())
}

pub async fn stats(config: &AppConfig, user_id: &str) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    let stats = app.manager.get_stats(user_id).await?;

    println!("Executions for {user_id}");
    println!("  Total:         {}", stats.total_executions);
    println!("  Completed:     {}", stats.completed_executions);
    println!("  Failed:        {}", stats.failed_executions);
    println!("  Success rate:  {:.1}%", stats.success_rate * 100.0);
    println!("  Avg duration:  {:.0} ms", stats.average_duration_ms);
    Ok(())
}

pub async fn cancel(config: &AppConfig, user_id: &str, execution_id: &str) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    let execution = app.manager.cancel(execution_id, user_id).await?;
    println!("{}", summary(&execution));
    Ok(())
}

/// One line per execution: id, status, age, duration and a preview.
fn summary(execution: &Execution) -> String {
    let duration = execution
        .duration_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "-".into());
    let detail = match (&execution.error_message, execution.output_text()) {
        (Some(error), _) => error.clone(),
        (None, Some(text)) => text.to_string(),
        (None, None) => String::new(),
    };
    let preview: String = detail.chars().take(60).collect();
    format!(
        "{}  {:<9}  {}  {:>8}  {}",
        execution.id,
        execution.status.as_str(),
        execution.created_at.format("%Y-%m-%d %H:%M:%S"),
        duration,
        preview.replace('\n', " ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentexec_core::execution::{ExecutionInput, ExecutionStatus};
    use serde_json::json;

    #[test]
    fn summary_prefers_the_error() {
        let mut execution = Execution::start("a1", "u1", ExecutionInput::default(), None);
        execution.status = ExecutionStatus::Failed;
        execution.error_message = Some("boom".into());
        execution.duration_ms = Some(12);
        let line = summary(&execution);
        assert!(line.contains("failed"));
        assert!(line.contains("12 ms"));
        assert!(line.ends_with("boom"));
    }

    #[test]
    fn summary_previews_output() {
        let mut execution = Execution::start("a1", "u1", ExecutionInput::default(), None);
        execution.status = ExecutionStatus::Completed;
        execution.output = Some(json!({"output": "line one\nline two"}));
        assert!(summary(&execution).ends_with("line one line two"));
    }
}
