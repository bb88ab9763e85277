use crate::content::Content;

/// Handshake acknowledgement. Carries no payload today.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SetupCompleteEvent {}

/// Streamed model output: audio parts, transcription fragments, and the
/// interruption / turn-completion flags. Any combination may be present.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContentEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_turn: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_transcription: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

impl ServerContentEvent {
    pub fn model_turn(&self) -> Option<&Content> {
        self.model_turn.as_ref()
    }

    pub fn input_transcription(&self) -> Option<&Transcription> {
        self.input_transcription.as_ref()
    }

    pub fn output_transcription(&self) -> Option<&Transcription> {
        self.output_transcription.as_ref()
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn turn_complete(&self) -> bool {
        self.turn_complete
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    text: String,
    #[serde(default)]
    finished: bool,
}

impl Transcription {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

/// A batch of function calls the model wants executed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    function_calls: Vec<FunctionCall>,
}

impl ToolCallEvent {
    pub fn function_calls(&self) -> &[FunctionCall] {
        &self.function_calls
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    id: String,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

impl FunctionCall {
    pub fn new(id: String, name: String, args: serde_json::Value) -> Self {
        Self { id, name, args }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }
}

/// Server-initiated close notice.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAwayEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    time_left: Option<String>,
}

impl GoAwayEvent {
    pub fn time_left(&self) -> Option<&str> {
        self.time_left.as_deref()
    }
}
