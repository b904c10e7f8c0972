//! Tool catalog: persisted [`ToolRecord`]s for built-ins and custom tools.
//!
//! Built-in records mirror the live [`ToolRegistry`] and are upserted by
//! [`ToolCatalog::sync_builtins`]. Custom records are metadata only: running
//! one returns a placeholder result echoing its parameters.

use crate::validation::validate_parameters;
use agentexec_core::error::{Error, Result, ToolError};
use agentexec_core::store::ToolRecordStore;
use agentexec_core::tool::{ToolContext, ToolRegistry};
use agentexec_core::tool_record::{ToolKind, ToolRecord};
use agentexec_credentials::scopes::{normalize_scopes, tool_scopes};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a built-in synchronisation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
}

/// Fields for a new catalog entry.
#[derive(Debug, Clone)]
pub struct ToolDraft {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub kind: ToolKind,
}

/// Partial update; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ToolPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schema: Option<Value>,
}

pub struct ToolCatalog {
    store: Arc<dyn ToolRecordStore>,
    builtins: ToolRegistry,
}

impl ToolCatalog {
    pub fn new(store: Arc<dyn ToolRecordStore>, builtins: ToolRegistry) -> Self {
        Self { store, builtins }
    }

    pub fn builtins(&self) -> &ToolRegistry {
        &self.builtins
    }

    /// Upsert a record for every built-in tool. Safe to call repeatedly.
    pub async fn sync_builtins(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for definition in self.builtins.definitions() {
            match self.store.find_tool_record(&definition.name).await? {
                None => {
                    let record = ToolRecord::new(
                        &definition.name,
                        &definition.description,
                        definition.parameters,
                        ToolKind::Builtin,
                    );
                    self.store.insert_tool_record(&record).await?;
                    report.created += 1;
                }
                Some(mut existing) => {
                    let changed = existing.description != definition.description
                        || existing.schema != definition.parameters
                        || existing.kind != ToolKind::Builtin;
                    if changed {
                        existing.description = definition.description;
                        existing.schema = definition.parameters;
                        existing.kind = ToolKind::Builtin;
                        existing.version += 1;
                        existing.updated_at = Utc::now();
                        self.store.update_tool_record(&existing).await?;
                        report.updated += 1;
                    }
                }
            }
        }

        match (report.created > 0, report.updated > 0) {
            (true, false) => info!(created = report.created, "Built-in tools initialized"),
            (false, true) => info!(updated = report.updated, "Built-in tools metadata refreshed"),
            (true, true) => info!(
                created = report.created,
                updated = report.updated,
                "Built-in tools synchronized"
            ),
            (false, false) => debug!("Built-in tools synchronized"),
        }
        Ok(report)
    }

    /// Fails with a store conflict when the name is already taken.
    pub async fn create_tool(&self, user_id: &str, draft: ToolDraft) -> Result<ToolRecord> {
        let record = ToolRecord::new(draft.name, draft.description, draft.schema, draft.kind);
        if let Err(e) = self.store.insert_tool_record(&record).await {
            warn!(user_id = %user_id, tool_name = %record.name, error = %e, "Failed to create tool");
            return Err(e.into());
        }
        info!(tool_id = %record.id, user_id = %user_id, "Tool created successfully");
        Ok(record)
    }

    /// Look a record up by id, falling back to its name.
    pub async fn get_tool(&self, identifier: &str) -> Result<ToolRecord> {
        if let Some(record) = self.store.get_tool_record(identifier).await? {
            return Ok(record);
        }
        self.store
            .find_tool_record(identifier)
            .await?
            .ok_or_else(|| Error::not_found("Tool", identifier))
    }

    pub async fn list_tools(&self, kind: Option<ToolKind>) -> Result<Vec<ToolRecord>> {
        let records = self.store.list_tool_records().await?;
        Ok(match kind {
            Some(kind) => records.into_iter().filter(|r| r.kind == kind).collect(),
            None => records,
        })
    }

    pub async fn update_tool(&self, tool_id: &str, patch: ToolPatch) -> Result<ToolRecord> {
        let mut record = self
            .store
            .get_tool_record(tool_id)
            .await?
            .ok_or_else(|| Error::not_found("Tool", tool_id))?;

        let mut changed = false;
        if let Some(name) = patch.name.filter(|n| *n != record.name) {
            record.name = name;
            changed = true;
        }
        if let Some(description) = patch.description.filter(|d| *d != record.description) {
            record.description = description;
            changed = true;
        }
        if let Some(schema) = patch.schema.filter(|s| *s != record.schema) {
            record.schema = schema;
            changed = true;
        }
        if !changed {
            return Ok(record);
        }

        record.version += 1;
        record.updated_at = Utc::now();
        if !self.store.update_tool_record(&record).await? {
            return Err(Error::not_found("Tool", tool_id));
        }
        info!(tool_id = %tool_id, version = record.version, "Tool updated successfully");
        Ok(record)
    }

    pub async fn delete_tool(&self, tool_id: &str) -> Result<()> {
        if !self.store.delete_tool_record(tool_id).await? {
            return Err(Error::not_found("Tool", tool_id));
        }
        info!(tool_id = %tool_id, "Tool deleted successfully");
        Ok(())
    }

    /// The live schema for built-ins, the stored one for custom tools.
    pub async fn tool_schema(&self, identifier: &str) -> Result<Value> {
        let record = self.get_tool(identifier).await?;
        Ok(self
            .builtins
            .get(&record.name)
            .map(|tool| tool.parameters_schema())
            .unwrap_or(record.schema))
    }

    /// Run a catalog entry outside the reasoning loop.
    ///
    /// Built-ins are validated then executed, and the outcome is wrapped as
    /// `{success, result, execution_time, error}`. Credential problems are
    /// returned as errors so callers can prompt for re-authorisation.
    pub async fn execute_record(
        &self,
        identifier: &str,
        parameters: Value,
        ctx: &ToolContext,
    ) -> Result<Value> {
        let record = self.get_tool(identifier).await?;
        debug!(
            tool_name = %record.name,
            tool_id = %record.id,
            user_id = %ctx.user_id,
            "Executing tool"
        );

        let Some(tool) = self.builtins.get(&record.name) else {
            return Ok(json!({
                "success": true,
                "result": {
                    "tool_id": record.id,
                    "parameters": parameters,
                    "message": "Custom tool execution placeholder",
                },
                "execution_time": 0.0,
                "error": null,
            }));
        };

        let started = Instant::now();
        let outcome = match validate_parameters(&tool.parameters_schema(), &parameters) {
            Ok(()) => tool.execute(ctx, parameters).await,
            Err(e) => Err(e),
        };
        let execution_time = started.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => Ok(json!({
                "success": result.success,
                "result": result.data.unwrap_or(Value::String(result.output)),
                "execution_time": execution_time,
                "error": null,
            })),
            Err(ToolError::Credential(e)) => Err(Error::Tool(ToolError::Credential(e))),
            Err(e) => {
                match &e {
                    ToolError::Validation(_) => warn!(
                        tool_id = %record.id,
                        user_id = %ctx.user_id,
                        error = %e,
                        "Tool validation error"
                    ),
                    _ => error!(
                        tool_id = %record.id,
                        user_id = %ctx.user_id,
                        error = %e,
                        "Tool execution failed"
                    ),
                }
                Ok(json!({
                    "success": false,
                    "result": null,
                    "execution_time": execution_time,
                    "error": e.to_string(),
                }))
            }
        }
    }

    /// OAuth scopes needed to run the named tools.
    pub fn required_scopes<S: AsRef<str>>(tool_names: &[S]) -> Vec<String> {
        normalize_scopes(
            tool_names
                .iter()
                .filter_map(|name| tool_scopes(name.as_ref()))
                .flatten()
                .copied(),
        )
    }
}
