//! `agentexec tools`: Sync and list the tool catalog.

use crate::app::{builtin_tools, open_store};
use agentexec_config::AppConfig;
use agentexec_tools::ToolCatalog;
use serde_json::json;
use std::sync::Arc;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let catalog = ToolCatalog::new(Arc::new(store.clone()), builtin_tools(config, &store));

    let report = catalog.sync_builtins().await?;
    eprintln!(
        "Catalog synced: {} created, {} updated",
        report.created, report.updated
    );

    let mut records = catalog.list_tools(None).await?;
    records.sort_by(|a, b| a.name.cmp(&b.name));

    let listing: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "kind": r.kind.as_str(),
                "version": r.version,
                "description": r.description,
                "schema": r.schema,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
