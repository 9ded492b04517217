//! Action executor: polymorphic dispatch for the four action types.
//!
//! `ActionExecutor` executes one action against a run's context and reports
//! the result as data -- an `ActionOutcome` -- never as an error or panic.
//! Unknown action types and malformed configs are failure outcomes with a
//! descriptive message; the engine decides fatality.
//!
//! Action types: `llm`, `document`, `variable`, `conditional`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use weft_types::document::{DocumentFormat, DocumentRequest};
use weft_types::draft::WorkflowAction;
use weft_types::llm::{ChatMessage, ChatRequest};

use crate::connector::document::BoxDocumentExporter;
use crate::connector::registry::ConnectorRegistry;

use super::context::RunContext;
use super::expression::evaluate_condition;

/// Variable name LLM actions write to when their config names none.
pub const DEFAULT_OUTPUT_VARIABLE: &str = "llm_response";

// ---------------------------------------------------------------------------
// ActionOutcome
// ---------------------------------------------------------------------------

/// Result of executing one action.
///
/// Failures are data, not errors: the caller inspects `success` and decides
/// whether the failure is fatal to the run.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Variable updates to merge into the run context by shallow overwrite.
    pub context_updates: HashMap<String, Value>,
}

impl ActionOutcome {
    fn ok(output: Option<Value>, context_updates: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            context_updates,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            context_updates: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed action configs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LlmActionConfig {
    prompt: String,
    #[serde(default)]
    connector_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    output_variable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentActionConfig {
    name: String,
    #[serde(default)]
    format: DocumentFormat,
    content: String,
}

#[derive(Debug, Deserialize)]
struct VariableActionConfig {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct ConditionalActionConfig {
    condition: String,
    #[serde(default, rename = "then")]
    then_actions: Vec<WorkflowAction>,
    #[serde(default, rename = "else")]
    else_actions: Vec<WorkflowAction>,
}

// ---------------------------------------------------------------------------
// ActionExecutor
// ---------------------------------------------------------------------------

/// Executes individual actions by dispatching on their type tag.
pub struct ActionExecutor {
    connectors: Arc<ConnectorRegistry>,
    exporter: Option<Arc<BoxDocumentExporter>>,
    default_output_variable: String,
}

impl ActionExecutor {
    /// Create an executor with the given connector registry and no document
    /// export capability.
    pub fn new(connectors: Arc<ConnectorRegistry>) -> Self {
        Self {
            connectors,
            exporter: None,
            default_output_variable: DEFAULT_OUTPUT_VARIABLE.to_string(),
        }
    }

    /// Attach a document export capability.
    pub fn with_exporter(mut self, exporter: Arc<BoxDocumentExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Override the default output variable for LLM actions.
    pub fn with_default_output_variable(mut self, name: impl Into<String>) -> Self {
        self.default_output_variable = name.into();
        self
    }

    /// Execute one action against the run context.
    pub async fn execute(&self, action: &WorkflowAction, ctx: &RunContext) -> ActionOutcome {
        self.execute_boxed(action, ctx).await
    }

    // Boxed so the conditional handler can recurse through the dispatcher.
    fn execute_boxed<'a>(
        &'a self,
        action: &'a WorkflowAction,
        ctx: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = ActionOutcome> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(
                action_id = action.id.as_str(),
                action_type = action.action_type.as_str(),
                "executing action"
            );
            match action.action_type.as_str() {
                "llm" => self.run_llm(action, ctx).await,
                "document" => self.run_document(action, ctx).await,
                "variable" => self.run_variable(action),
                "conditional" => self.run_conditional(action, ctx).await,
                other => ActionOutcome::failure(format!(
                    "unknown action type '{}' for action '{}'",
                    other, action.id
                )),
            }
        })
    }

    fn parse_config<T: serde::de::DeserializeOwned>(action: &WorkflowAction) -> Result<T, String> {
        serde_json::from_value(Value::Object(action.config.clone())).map_err(|e| {
            format!(
                "invalid {} action config for '{}': {}",
                action.action_type, action.id, e
            )
        })
    }

    // -- llm: prompt interpolation + chat completion --

    async fn run_llm(&self, action: &WorkflowAction, ctx: &RunContext) -> ActionOutcome {
        let config: LlmActionConfig = match Self::parse_config(action) {
            Ok(config) => config,
            Err(message) => return ActionOutcome::failure(message),
        };

        let connector = match &config.connector_id {
            Some(id) => self.connectors.get_llm_connector(id),
            None => self.connectors.default_llm_connector(),
        };
        let Some(connector) = connector else {
            return ActionOutcome::failure(format!(
                "no LLM connector available for action '{}' (requested: {})",
                action.id,
                config.connector_id.as_deref().unwrap_or("<default>")
            ));
        };

        let prompt = ctx.interpolate_text(&config.prompt);
        let request = ChatRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        match connector.chat(&request).await {
            Ok(response) => {
                let output_variable = config
                    .output_variable
                    .clone()
                    .unwrap_or_else(|| self.default_output_variable.clone());
                let usage =
                    serde_json::to_value(response.usage).unwrap_or(Value::Null);
                let content = json!(response.content);
                let updates = HashMap::from([
                    (output_variable.clone(), content.clone()),
                    (format!("{output_variable}_usage"), usage),
                ]);
                ActionOutcome::ok(Some(content), updates)
            }
            Err(e) => ActionOutcome::failure(format!("llm action '{}' failed: {e}", action.id)),
        }
    }

    // -- document: content interpolation + export --

    async fn run_document(&self, action: &WorkflowAction, ctx: &RunContext) -> ActionOutcome {
        let config: DocumentActionConfig = match Self::parse_config(action) {
            Ok(config) => config,
            Err(message) => return ActionOutcome::failure(message),
        };

        let Some(exporter) = &self.exporter else {
            return ActionOutcome::failure(format!(
                "no document exporter available for action '{}'",
                action.id
            ));
        };

        let request = DocumentRequest {
            name: config.name.clone(),
            format: config.format,
            content: ctx.interpolate_text(&config.content),
        };

        match exporter.export(&request).await {
            Ok(export) => {
                let path = export.path.display().to_string();
                let updates =
                    HashMap::from([(format!("document_{}", config.name), json!(path))]);
                let output = serde_json::to_value(&export).ok();
                ActionOutcome::ok(output, updates)
            }
            Err(e) => {
                ActionOutcome::failure(format!("document action '{}' failed: {e}", action.id))
            }
        }
    }

    // -- variable: pure assignment --

    fn run_variable(&self, action: &WorkflowAction) -> ActionOutcome {
        let config: VariableActionConfig = match Self::parse_config(action) {
            Ok(config) => config,
            Err(message) => return ActionOutcome::failure(message),
        };

        if config.name.is_empty() {
            return ActionOutcome::failure(format!(
                "variable action '{}' requires a non-empty name",
                action.id
            ));
        }

        let updates = HashMap::from([(config.name, config.value.clone())]);
        ActionOutcome::ok(Some(config.value), updates)
    }

    // -- conditional: branch selection + recursive sub-execution --

    async fn run_conditional(&self, action: &WorkflowAction, ctx: &RunContext) -> ActionOutcome {
        let config: ConditionalActionConfig = match Self::parse_config(action) {
            Ok(config) => config,
            Err(message) => return ActionOutcome::failure(message),
        };

        let condition_met = match evaluate_condition(&config.condition, &ctx.variables) {
            Ok(met) => met,
            Err(e) => {
                return ActionOutcome::failure(format!(
                    "conditional action '{}' condition error: {e}",
                    action.id
                ));
            }
        };

        let branch = if condition_met {
            &config.then_actions
        } else {
            &config.else_actions
        };
        tracing::debug!(
            action_id = action.id.as_str(),
            condition_met,
            branch_len = branch.len(),
            "conditional branch selected"
        );

        // Sub-actions observe updates from earlier siblings, so maintain a
        // running snapshot and merge in declaration order.
        let mut scratch = ctx.clone();
        let mut merged: HashMap<String, Value> = HashMap::new();
        let mut results = Vec::with_capacity(branch.len());
        let mut errors = Vec::new();
        let mut success = true;

        for sub_action in branch {
            let outcome = self.execute_boxed(sub_action, &scratch).await;
            success &= outcome.success;
            if let Some(error) = &outcome.error {
                errors.push(format!("{}: {}", sub_action.id, error));
            }
            for (key, value) in &outcome.context_updates {
                merged.insert(key.clone(), value.clone());
            }
            scratch.merge_updates(&outcome.context_updates);
            results.push(json!({
                "action_id": sub_action.id,
                "success": outcome.success,
                "output": outcome.output,
            }));
        }

        ActionOutcome {
            success,
            output: Some(json!({
                "condition_met": condition_met,
                "branch": if condition_met { "then" } else { "else" },
                "results": results,
            })),
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
            context_updates: merged,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
