/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Mime type attached to every outbound realtime media chunk.
pub const INPUT_AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";
