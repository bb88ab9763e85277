//! Executes the side effects the model requests through tool calls and
//! reports one result per call, correlated by call id. A failed call never
//! tears the session down and never aborts its siblings in the same batch.

use planvoice_types::events::client::FunctionResponse;
use planvoice_types::events::server::FunctionCall;
use planvoice_types::plan::{Priority, Status, Task};
use planvoice_types::tools;

use crate::error::SessionError;

pub const SUCCESS_RESULT: &str = "Function executed successfully.";

/// Collaborator owning the project's task plan. The dispatcher never keeps a
/// private copy; every mutation goes through `apply`, which persists
/// immediately.
#[cfg_attr(test, mockall::automock)]
pub trait PlanStore: Send + Sync {
    fn current_plan(&self) -> Vec<Task>;
    fn apply(&self, plan: Vec<Task>);
}

impl<T: PlanStore + ?Sized> PlanStore for std::sync::Arc<T> {
    fn current_plan(&self) -> Vec<Task> {
        (**self).current_plan()
    }

    fn apply(&self, plan: Vec<Task>) {
        (**self).apply(plan)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct AddTaskArgs {
    task: Task,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditTaskArgs {
    task_id: String,
    title: Option<String>,
    description: Option<String>,
    priority: Option<Priority>,
    time_estimate: Option<String>,
    status: Option<Status>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSubtaskArgs {
    task_id: String,
    subtask_id: String,
}

/// The three functions declared to the model, as a closed set. Parsing
/// validates the argument payload against the declared schema; anything else
/// becomes a tool execution error rather than a panic.
#[derive(Debug)]
pub enum PlanFunction {
    AddTask(AddTaskArgs),
    EditTask(EditTaskArgs),
    CompleteSubtask(CompleteSubtaskArgs),
}

impl PlanFunction {
    pub fn parse(call: &FunctionCall) -> Result<Self, SessionError> {
        let args = call.args().clone();
        match call.name() {
            tools::ADD_TASK_TO_PLAN => serde_json::from_value(args)
                .map(PlanFunction::AddTask)
                .map_err(|e| bad_args(call.name(), e)),
            tools::EDIT_TASK_IN_PLAN => serde_json::from_value(args)
                .map(PlanFunction::EditTask)
                .map_err(|e| bad_args(call.name(), e)),
            tools::COMPLETE_SUBTASK => serde_json::from_value(args)
                .map(PlanFunction::CompleteSubtask)
                .map_err(|e| bad_args(call.name(), e)),
            other => Err(SessionError::Tool(format!("unknown function: {other}"))),
        }
    }
}

fn bad_args(name: &str, e: serde_json::Error) -> SessionError {
    SessionError::Tool(format!("invalid arguments for {name}: {e}"))
}

/// Result of one dispatched batch: exactly one response per received call,
/// plus side channels for the transcript and the error surface.
pub struct BatchOutcome {
    pub responses: Vec<FunctionResponse>,
    pub notices: Vec<String>,
    pub errors: Vec<SessionError>,
}

pub struct ToolDispatcher<S: PlanStore> {
    store: S,
}

impl<S: PlanStore> ToolDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Dispatches a batch of function calls. Every call produces exactly one
    /// correlated response; failures carry the error description as their
    /// result and are additionally collected in `errors`.
    pub fn dispatch_batch(&self, calls: &[FunctionCall]) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            responses: Vec::with_capacity(calls.len()),
            notices: Vec::new(),
            errors: Vec::new(),
        };
        for call in calls {
            let result = PlanFunction::parse(call).and_then(|function| self.execute(function));
            let response_text = match result {
                Ok(notice) => {
                    tracing::info!("tool call {} ({}) succeeded", call.id(), call.name());
                    outcome.notices.push(notice);
                    SUCCESS_RESULT.to_string()
                }
                Err(e) => {
                    tracing::error!("tool call {} ({}) failed: {}", call.id(), call.name(), e);
                    let text = e.to_string();
                    outcome.errors.push(e);
                    text
                }
            };
            outcome.responses.push(FunctionResponse::new(
                call.id().to_string(),
                call.name().to_string(),
                response_text,
            ));
        }
        outcome
    }

    /// Runs one mutation against the plan store and returns the
    /// system-message notice describing it.
    fn execute(&self, function: PlanFunction) -> Result<String, SessionError> {
        match function {
            PlanFunction::AddTask(args) => {
                let task = args.task.with_generated_ids();
                let title = task.title.clone();
                let mut plan = self.store.current_plan();
                plan.push(task);
                self.store.apply(plan);
                Ok(format!("Added task \"{title}\" to the plan."))
            }
            PlanFunction::EditTask(args) => {
                let mut plan = self.store.current_plan();
                let task = plan
                    .iter_mut()
                    .find(|task| task.id == args.task_id)
                    .ok_or_else(|| {
                        SessionError::Tool(format!("no task with id {:?}", args.task_id))
                    })?;
                if let Some(title) = args.title {
                    task.title = title;
                }
                if let Some(description) = args.description {
                    task.description = description;
                }
                if let Some(priority) = args.priority {
                    task.priority = priority;
                }
                if let Some(time_estimate) = args.time_estimate {
                    task.time_estimate = time_estimate;
                }
                if let Some(status) = args.status {
                    task.status = status;
                }
                let title = task.title.clone();
                self.store.apply(plan);
                Ok(format!("Updated task \"{title}\"."))
            }
            PlanFunction::CompleteSubtask(args) => {
                let mut plan = self.store.current_plan();
                let task = plan
                    .iter_mut()
                    .find(|task| task.id == args.task_id)
                    .ok_or_else(|| {
                        SessionError::Tool(format!("no task with id {:?}", args.task_id))
                    })?;
                let subtask = task
                    .subtasks
                    .iter_mut()
                    .find(|subtask| subtask.id == args.subtask_id)
                    .ok_or_else(|| {
                        SessionError::Tool(format!(
                            "no subtask with id {:?} in task {:?}",
                            args.subtask_id, args.task_id
                        ))
                    })?;
                subtask.completed = true;
                let text = subtask.text.clone();
                self.store.apply(plan);
                Ok(format!("Marked subtask \"{text}\" as completed."))
            }
        }
    }
}
