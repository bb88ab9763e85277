//! The task plan mutated by the live assistant's tool calls. The plan itself
//! is owned by the embedding application; these types only describe its shape
//! on the wire and in memory.

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
}

impl Default for Status {
    fn default() -> Self {
        Status::ToDo
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Subtask {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub time_estimate: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    /// Fills in any identifiers the model omitted. Existing identifiers are
    /// kept so re-sent tasks stay stable.
    pub fn with_generated_ids(mut self) -> Self {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        for subtask in &mut self.subtasks {
            if subtask.id.is_empty() {
                subtask.id = uuid::Uuid::new_v4().to_string();
            }
        }
        self
    }
}
