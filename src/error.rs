/// Errors surfaced by the live assistant session. Tool and capture failures
/// never tear the session down; configuration and transport failures do.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("audio capture error: {0}")]
    Capture(String),

    #[error("audio playback error: {0}")]
    Playback(String),

    #[error("tool execution error: {0}")]
    Tool(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
