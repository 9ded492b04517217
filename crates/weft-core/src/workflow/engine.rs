//! Execution engine: validates drafts, creates durable runs, and drives the
//! node/transition graph to completion as a detached asynchronous traversal.
//!
//! # Execution flow
//!
//! 1. `execute_workflow` validates the draft, creates a `WorkflowRun` record,
//!    emits `workflow-started`, and spawns the traversal task; the caller
//!    gets the run id immediately.
//! 2. Each traversal iteration persists the position, emits `node-entered`,
//!    runs entry actions, selects the first transition from the node, checks
//!    its trigger and validators, runs exit actions, emits `node-exited`,
//!    and advances.
//! 3. A node without an outgoing transition is terminal; a conditional
//!    trigger that is not yet satisfied suspends the run (`paused`, reason
//!    `trigger-not-ready`); any action or validator failure is fatal.
//!
//! The traversal task never lets an error escape: failures are persisted on
//! the run, `workflow-failed` is emitted, and other runs are unaffected.
//! Pause is advisory -- it takes effect at the next iteration boundary, never
//! inside an action.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use weft_types::config::EngineConfig;
use weft_types::draft::{TransitionTrigger, TransitionValidator, WorkflowAction, WorkflowDraft};
use weft_types::error::RepositoryError;
use weft_types::run::{RunEventType, RunStatus};

use crate::event::publisher::EventPublisher;
use crate::repository::run::RunStore;

use super::action::ActionExecutor;
use super::context::RunContext;
use super::expression::{ExpressionError, evaluate_condition};
use super::validation::validate_draft;

/// Emitter label stamped on events the engine persists.
const EVENT_EMITTER: &str = "engine";

/// Default ceiling on traversal iterations per run.
pub const DEFAULT_MAX_TRAVERSAL_STEPS: u32 = 10_000;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for starting a workflow run.
#[derive(Debug, Default)]
pub struct ExecuteOptions {
    /// Seed variables for the run context.
    pub initial_variables: HashMap<String, Value>,
    /// Free-form metadata stamped on the run context.
    pub metadata: HashMap<String, Value>,
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors raised by the execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Draft failed structural validation (aggregated message).
    #[error("draft validation failed: {0}")]
    Validation(String),

    /// Draft does not have exactly one start node.
    #[error("draft must have exactly one start node, found {0}")]
    StartNodeCount(usize),

    /// Run id does not exist in the store.
    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// Lifecycle operation called from an illegal run status.
    #[error("run {run_id} is {actual}, expected {expected}")]
    IllegalRunStatus {
        run_id: Uuid,
        expected: RunStatus,
        actual: RunStatus,
    },

    /// A traversal loop is already driving this run.
    #[error("a traversal is already active for run {0}")]
    TraversalActive(Uuid),

    /// The position pointer references a node the draft does not contain.
    #[error("node '{node_id}' not found in draft")]
    MissingNode { node_id: String },

    /// An entry or exit action failed.
    #[error("action '{action_id}' failed: {error}")]
    ActionFailed { action_id: String, error: String },

    /// A transition validator evaluated false.
    #[error("validator on transition '{transition_id}' failed")]
    ValidatorFailed { transition_id: String },

    /// A gate expression could not be parsed.
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Traversal exceeded the configured step ceiling.
    #[error("traversal exceeded {0} steps")]
    StepLimitExceeded(u32),

    /// Persisted run context could not be restored.
    #[error("context error: {0}")]
    Context(String),

    /// Underlying storage operation failed.
    #[error("storage error: {0}")]
    Repository(String),
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        EngineError::Repository(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Drives workflow drafts to completion as durable, resumable runs.
///
/// Generic over `S: RunStore` for storage flexibility. The event publisher
/// is injected explicitly -- one per engine, no global instance.
pub struct ExecutionEngine<S: RunStore> {
    store: Arc<S>,
    publisher: Arc<EventPublisher>,
    executor: Arc<ActionExecutor>,
    /// Cancellation tokens for the runs whose traversal is in flight.
    /// Doubles as the per-run single-traversal guard.
    active: Arc<DashMap<Uuid, CancellationToken>>,
    max_traversal_steps: u32,
}

impl<S: RunStore + 'static> ExecutionEngine<S> {
    /// Create an engine with default limits.
    pub fn new(
        store: Arc<S>,
        publisher: Arc<EventPublisher>,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            store,
            publisher,
            executor,
            active: Arc::new(DashMap::new()),
            max_traversal_steps: DEFAULT_MAX_TRAVERSAL_STEPS,
        }
    }

    /// Apply limits from an `EngineConfig`.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.max_traversal_steps = config.max_traversal_steps;
        self
    }

    /// Override the traversal step ceiling.
    pub fn with_max_traversal_steps(mut self, max: u32) -> Self {
        self.max_traversal_steps = max;
        self
    }

    /// The publisher this engine emits progress events to.
    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Validate a draft, create a run, and launch its traversal.
    ///
    /// Returns the run id immediately; the traversal proceeds as a detached
    /// task and reports through the run record and the event stream.
    pub async fn execute_workflow(
        &self,
        draft: &WorkflowDraft,
        workflow_id: Uuid,
        options: ExecuteOptions,
    ) -> Result<Uuid, EngineError> {
        let report = validate_draft(draft);
        if !report.valid {
            return Err(EngineError::Validation(report.aggregated_message()));
        }
        for warning in &report.warnings {
            tracing::warn!(
                workflow = draft.name.as_str(),
                warning = warning.as_str(),
                "draft validation warning"
            );
        }

        let starts = draft.start_nodes();
        if starts.len() != 1 {
            return Err(EngineError::StartNodeCount(starts.len()));
        }
        let start_id = starts[0].id.clone();

        let mut ctx = RunContext::new(Some(start_id));
        ctx.variables = options.initial_variables;
        ctx.metadata = options.metadata;
        ctx.metadata
            .insert("workflow_name".to_string(), json!(draft.name));

        let run = self
            .store
            .create_run(workflow_id, Some(draft.id), &ctx.to_json())
            .await?;

        emit(
            self.store.as_ref(),
            self.publisher.as_ref(),
            run.id,
            RunEventType::WorkflowStarted,
            Some(json!({
                "workflow_name": draft.name,
                "draft_version_id": draft.id,
            })),
        )
        .await?;

        tracing::info!(
            run_id = %run.id,
            workflow = draft.name.as_str(),
            "starting workflow run"
        );

        let token = CancellationToken::new();
        self.active.insert(run.id, token.clone());
        self.spawn_traversal(draft.clone(), run.id, token);

        Ok(run.id)
    }

    /// Pause a running workflow.
    ///
    /// Advisory: the traversal observes the pause at its next iteration
    /// boundary; a mid-flight action is allowed to finish.
    pub async fn pause_run(&self, run_id: Uuid) -> Result<(), EngineError> {
        let run = self
            .store
            .get_run(&run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;
        if run.status != RunStatus::Running {
            return Err(EngineError::IllegalRunStatus {
                run_id,
                expected: RunStatus::Running,
                actual: run.status,
            });
        }

        self.store
            .update_run_status(&run_id, RunStatus::Paused, None)
            .await?;
        emit(
            self.store.as_ref(),
            self.publisher.as_ref(),
            run_id,
            RunEventType::WorkflowPaused,
            Some(json!({"reason": "manual"})),
        )
        .await?;

        if let Some(token) = self.active.get(&run_id) {
            token.cancel();
        }
        tracing::info!(run_id = %run_id, "workflow run paused");
        Ok(())
    }

    /// Resume a paused workflow from its persisted position.
    ///
    /// Re-enters the traversal loop at the run's `current_node`, falling
    /// back to the draft's start node when the pointer is absent. Refuses
    /// to start a second traversal for a run that still has one in flight.
    pub async fn resume_run(
        &self,
        run_id: Uuid,
        draft: &WorkflowDraft,
    ) -> Result<(), EngineError> {
        let run = self
            .store
            .get_run(&run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;
        if run.status != RunStatus::Paused {
            return Err(EngineError::IllegalRunStatus {
                run_id,
                expected: RunStatus::Paused,
                actual: run.status,
            });
        }

        let token = CancellationToken::new();
        match self.active.entry(run_id) {
            Entry::Occupied(_) => return Err(EngineError::TraversalActive(run_id)),
            Entry::Vacant(vacant) => {
                vacant.insert(token.clone());
            }
        }

        let resumed = async {
            self.store
                .update_run_status(&run_id, RunStatus::Running, None)
                .await?;
            emit(
                self.store.as_ref(),
                self.publisher.as_ref(),
                run_id,
                RunEventType::WorkflowResumed,
                None,
            )
            .await
        }
        .await;
        if let Err(e) = resumed {
            self.active.remove(&run_id);
            return Err(e);
        }

        tracing::info!(run_id = %run_id, "resuming workflow run");
        self.spawn_traversal(draft.clone(), run_id, token);
        Ok(())
    }

    /// Launch the traversal task with a catch-all boundary: any error is
    /// recorded on the run and never escapes.
    fn spawn_traversal(&self, draft: WorkflowDraft, run_id: Uuid, token: CancellationToken) {
        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);
        let executor = Arc::clone(&self.executor);
        let active = Arc::clone(&self.active);
        let max_steps = self.max_traversal_steps;

        tokio::spawn(async move {
            let result = drive_traversal(
                store.as_ref(),
                publisher.as_ref(),
                executor.as_ref(),
                &draft,
                run_id,
                &token,
                max_steps,
            )
            .await;
            active.remove(&run_id);

            if let Err(error) = result {
                let message = error.to_string();
                tracing::error!(
                    run_id = %run_id,
                    error = message.as_str(),
                    "workflow run failed"
                );
                if let Err(e) = store
                    .update_run_status(&run_id, RunStatus::Failed, Some(&message))
                    .await
                {
                    tracing::error!(run_id = %run_id, error = %e, "failed to persist run failure");
                }
                if let Err(e) = emit(
                    store.as_ref(),
                    publisher.as_ref(),
                    run_id,
                    RunEventType::WorkflowFailed,
                    Some(json!({"error": message})),
                )
                .await
                {
                    tracing::error!(run_id = %run_id, error = %e, "failed to record failure event");
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Traversal loop
// ---------------------------------------------------------------------------

async fn drive_traversal<S: RunStore>(
    store: &S,
    publisher: &EventPublisher,
    executor: &ActionExecutor,
    draft: &WorkflowDraft,
    run_id: Uuid,
    cancel: &CancellationToken,
    max_steps: u32,
) -> Result<(), EngineError> {
    let run = store
        .get_run(&run_id)
        .await?
        .ok_or(EngineError::RunNotFound(run_id))?;
    let mut ctx =
        RunContext::from_json(run.context).map_err(|e| EngineError::Context(e.to_string()))?;
    if ctx.current_node.is_none() {
        ctx.current_node = draft.start_nodes().first().map(|n| n.id.clone());
    }

    let mut steps = 0u32;
    loop {
        // Cooperative suspension point: pause takes effect here only.
        if cancel.is_cancelled() {
            tracing::debug!(run_id = %run_id, "traversal stopping at pause boundary");
            return Ok(());
        }
        steps += 1;
        if steps > max_steps {
            return Err(EngineError::StepLimitExceeded(max_steps));
        }

        let node_id = ctx.current_node.clone().unwrap_or_default();
        let Some(node) = draft.node(&node_id) else {
            return Err(EngineError::MissingNode { node_id });
        };

        store
            .update_run_context(&run_id, &ctx.to_json(), Some(&node.id))
            .await?;
        emit(
            store,
            publisher,
            run_id,
            RunEventType::NodeEntered,
            Some(json!({"node_id": node.id, "label": node.label})),
        )
        .await?;

        run_actions(
            store,
            publisher,
            executor,
            run_id,
            &node.id,
            &node.entry_actions,
            "entry",
            &mut ctx,
        )
        .await?;

        let Some(transition) = draft.first_transition_from(&node.id) else {
            // Terminal node.
            store
                .update_run_context(&run_id, &ctx.to_json(), Some(&node.id))
                .await?;
            emit(
                store,
                publisher,
                run_id,
                RunEventType::WorkflowCompleted,
                Some(json!({
                    "node_id": node.id,
                    "nodes_visited": ctx.history.len() + 1,
                })),
            )
            .await?;
            store
                .update_run_status(&run_id, RunStatus::Completed, None)
                .await?;
            tracing::info!(run_id = %run_id, "workflow run completed");
            return Ok(());
        };

        if let Some(TransitionTrigger::Conditional { expression }) = &transition.trigger {
            let ready = evaluate_condition(expression, &ctx.variables)?;
            if !ready {
                // Suspension, not failure: the trigger is not yet satisfied.
                store
                    .update_run_context(&run_id, &ctx.to_json(), Some(&node.id))
                    .await?;
                store
                    .update_run_status(&run_id, RunStatus::Paused, None)
                    .await?;
                emit(
                    store,
                    publisher,
                    run_id,
                    RunEventType::WorkflowPaused,
                    Some(json!({
                        "reason": "trigger-not-ready",
                        "node_id": node.id,
                        "transition_id": transition.id,
                    })),
                )
                .await?;
                tracing::info!(
                    run_id = %run_id,
                    transition_id = transition.id.as_str(),
                    "run suspended waiting on trigger"
                );
                return Ok(());
            }
        }

        for validator in &transition.validators {
            let TransitionValidator::Expression { expression } = validator;
            if !evaluate_condition(expression, &ctx.variables)? {
                return Err(EngineError::ValidatorFailed {
                    transition_id: transition.id.clone(),
                });
            }
        }

        run_actions(
            store,
            publisher,
            executor,
            run_id,
            &node.id,
            &node.exit_actions,
            "exit",
            &mut ctx,
        )
        .await?;

        emit(
            store,
            publisher,
            run_id,
            RunEventType::NodeExited,
            Some(json!({"node_id": node.id, "next": transition.target})),
        )
        .await?;
        ctx.advance(transition.target.clone());
    }
}

/// Execute an action list sequentially, merging each success into the
/// context immediately so later actions in the same list observe it. The
/// first failure is fatal.
#[allow(clippy::too_many_arguments)]
async fn run_actions<S: RunStore>(
    store: &S,
    publisher: &EventPublisher,
    executor: &ActionExecutor,
    run_id: Uuid,
    node_id: &str,
    actions: &[WorkflowAction],
    phase: &str,
    ctx: &mut RunContext,
) -> Result<(), EngineError> {
    for action in actions {
        let outcome = executor.execute(action, ctx).await;
        if outcome.success {
            ctx.merge_updates(&outcome.context_updates);
            emit(
                store,
                publisher,
                run_id,
                RunEventType::ActionExecuted,
                Some(json!({
                    "action_id": action.id,
                    "action_type": action.action_type,
                    "node_id": node_id,
                    "phase": phase,
                })),
            )
            .await?;
        } else {
            let error = outcome
                .error
                .unwrap_or_else(|| "action failed".to_string());
            emit(
                store,
                publisher,
                run_id,
                RunEventType::ActionFailed,
                Some(json!({
                    "action_id": action.id,
                    "node_id": node_id,
                    "phase": phase,
                    "error": error,
                })),
            )
            .await?;
            return Err(EngineError::ActionFailed {
                action_id: action.id.clone(),
                error,
            });
        }
    }
    Ok(())
}

/// Persist an event row and fan it out to subscribers.
///
/// These are separate writes; a crash between them is recoverable because
/// both derive from the persisted position and context.
async fn emit<S: RunStore>(
    store: &S,
    publisher: &EventPublisher,
    run_id: Uuid,
    event_type: RunEventType,
    payload: Option<Value>,
) -> Result<(), EngineError> {
    let event = store
        .add_event(&run_id, event_type, payload, Some(EVENT_EMITTER))
        .await?;
    publisher.publish(&event);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
