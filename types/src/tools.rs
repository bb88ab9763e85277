//! Declarations of the functions the model is allowed to call. The names are
//! part of the wire contract and must not change without versioning the
//! session setup.

pub const ADD_TASK_TO_PLAN: &str = "add_task_to_plan";
pub const EDIT_TASK_IN_PLAN: &str = "edit_task_in_plan";
pub const COMPLETE_SUBTASK: &str = "complete_subtask";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function in JSON Schema format
    parameters: serde_json::Value,
}

impl FunctionDeclaration {
    pub fn new(name: String, description: String, parameters: serde_json::Value) -> Self {
        Self {
            name,
            description,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }
}

/// The registry sent to the live endpoint during setup.
pub fn plan_function_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration::new(
            ADD_TASK_TO_PLAN.to_string(),
            "Add a new task to the current project plan.".to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "description": { "type": "string" },
                            "priority": { "type": "string", "enum": ["High", "Medium", "Low"] },
                            "timeEstimate": { "type": "string" },
                            "status": { "type": "string", "enum": ["To Do", "In Progress", "Done"] },
                            "subtasks": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "id": { "type": "string" },
                                        "text": { "type": "string" },
                                        "completed": { "type": "boolean" }
                                    },
                                    "required": ["text"]
                                }
                            }
                        },
                        "required": ["title", "description", "priority", "timeEstimate", "subtasks"]
                    }
                },
                "required": ["task"]
            }),
        ),
        FunctionDeclaration::new(
            EDIT_TASK_IN_PLAN.to_string(),
            "Edit fields of an existing task. Only the provided fields change.".to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "priority": { "type": "string", "enum": ["High", "Medium", "Low"] },
                    "timeEstimate": { "type": "string" },
                    "status": { "type": "string", "enum": ["To Do", "In Progress", "Done"] }
                },
                "required": ["taskId"]
            }),
        ),
        FunctionDeclaration::new(
            COMPLETE_SUBTASK.to_string(),
            "Mark a subtask of a task as completed.".to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "subtaskId": { "type": "string" }
                },
                "required": ["taskId", "subtaskId"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_declares_the_three_plan_functions() {
        let declarations = plan_function_declarations();
        let names: Vec<&str> = declarations.iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            vec![ADD_TASK_TO_PLAN, EDIT_TASK_IN_PLAN, COMPLETE_SUBTASK]
        );
    }

    #[test]
    fn every_declaration_is_an_object_schema_with_required_fields() {
        for declaration in plan_function_declarations() {
            let schema = declaration.parameters();
            assert_eq!(schema["type"], "object", "{}", declaration.name());
            assert!(
                schema["required"].as_array().is_some_and(|r| !r.is_empty()),
                "{} must declare required fields",
                declaration.name()
            );
        }
    }
}
