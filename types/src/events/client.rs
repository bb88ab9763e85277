use crate::content::{Blob, Content};
use crate::tools::FunctionDeclaration;

/// First message on a fresh connection: model selection, response modality,
/// system instruction, and the declared tools.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupEvent {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    tools: Vec<ToolSet>,
}

impl SetupEvent {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
            },
            system_instruction: None,
            tools: vec![],
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::system_text(instruction));
        self
    }

    pub fn with_function_declarations(mut self, declarations: Vec<FunctionDeclaration>) -> Self {
        self.tools.push(ToolSet {
            function_declarations: declarations,
        });
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

/// A batch of realtime media chunks, normally a single encoded audio block.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputEvent {
    media_chunks: Vec<Blob>,
}

impl RealtimeInputEvent {
    pub fn new(media_chunks: Vec<Blob>) -> Self {
        Self { media_chunks }
    }

    pub fn media_chunks(&self) -> &[Blob] {
        &self.media_chunks
    }
}

/// A typed text turn. `turn_complete` tells the server the user is done.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentEvent {
    turns: Vec<Content>,
    turn_complete: bool,
}

impl ClientContentEvent {
    pub fn user_turn(text: impl Into<String>) -> Self {
        Self {
            turns: vec![Content::user_text(text)],
            turn_complete: true,
        }
    }

    pub fn turns(&self) -> &[Content] {
        &self.turns
    }
}

/// Responses to a received tool-call batch, correlated by call id.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseEvent {
    function_responses: Vec<FunctionResponse>,
}

impl ToolResponseEvent {
    pub fn new(function_responses: Vec<FunctionResponse>) -> Self {
        Self { function_responses }
    }

    pub fn function_responses(&self) -> &[FunctionResponse] {
        &self.function_responses
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionResponse {
    id: String,
    name: String,
    response: serde_json::Value,
}

impl FunctionResponse {
    pub fn new(id: String, name: String, result: impl Into<String>) -> Self {
        Self {
            id,
            name,
            response: serde_json::json!({ "result": result.into() }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> Option<&str> {
        self.response.get("result").and_then(|r| r.as_str())
    }
}
