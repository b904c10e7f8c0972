//! `agentexec run`: Execute an agent definition once.

use crate::agent_file::AgentFile;
use crate::app::App;
use agentexec_config::AppConfig;
use agentexec_core::execution::ExecutionStatus;
use agentexec_core::store::AgentStore;
use serde_json::{Map, Value};
use std::path::Path;

/// Parse `key=value`. The value is taken as JSON when it parses, else as a string.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn run(
    config: &AppConfig,
    user_id: &str,
    agent_path: &Path,
    input: String,
    session: Option<String>,
    params: Vec<(String, Value)>,
) -> anyhow::Result<()> {
    let mut agent = AgentFile::load(agent_path)?.into_agent(user_id);
    let app = App::build(config).await?;

    // Re-running the same file keeps the original creation time
    if let Some(existing) = app.store.get_agent(&agent.id).await? {
        agent.created_at = existing.created_at;
    }
    app.store.put_agent(agent.clone()).await?;

    let parameters: Map<String, Value> = params.into_iter().collect();
    let execution = app
        .manager
        .execute(&agent.id, user_id, input, parameters, session)
        .await?;

    println!("{}", serde_json::to_string_pretty(&execution)?);

    match execution.status {
        ExecutionStatus::Completed => Ok(()),
        status => anyhow::bail!(
            "Execution {} ended {}: {}",
            execution.id,
            status.as_str(),
            execution.error_message.as_deref().unwrap_or("no details")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_when_possible() {
        assert_eq!(parse_param("max_steps=5").unwrap(), ("max_steps".into(), json!(5)));
        assert_eq!(parse_param("verbose=true").unwrap(), ("verbose".into(), json!(true)));
        assert_eq!(parse_param("name=Ada").unwrap(), ("name".into(), json!("Ada")));
    }

    #[test]
    fn only_the_first_equals_splits() {
        assert_eq!(parse_param("q=a=b").unwrap(), ("q".into(), json!("a=b")));
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=5").is_err());
    }
}
