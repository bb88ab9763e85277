pub mod client;
pub mod server;

use client::*;
use server::*;

/// Messages sent to the live endpoint. The wire format is oneof-by-field:
/// each JSON object carries exactly one of these keys.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    Setup(SetupEvent),
    RealtimeInput(RealtimeInputEvent),
    ClientContent(ClientContentEvent),
    ToolResponse(ToolResponseEvent),
}

/// Messages received from the live endpoint, demultiplexed by key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerEvent {
    SetupComplete(SetupCompleteEvent),
    ServerContent(ServerContentEvent),
    ToolCall(ToolCallEvent),
    GoAway(GoAwayEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Blob;
    use crate::audio::INPUT_AUDIO_MIME_TYPE;

    #[test]
    fn realtime_input_serializes_as_oneof_by_field() {
        let event = ClientEvent::RealtimeInput(RealtimeInputEvent::new(vec![Blob::new(
            INPUT_AUDIO_MIME_TYPE,
            "AAAA".to_string(),
        )]));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");
    }

    #[test]
    fn tool_call_batch_deserializes() {
        let text = r#"{"toolCall":{"functionCalls":[
            {"id":"call-1","name":"complete_subtask","args":{"taskId":"t","subtaskId":"s"}},
            {"id":"call-2","name":"edit_task_in_plan","args":{"taskId":"t","status":"Done"}}
        ]}}"#;
        let event: ServerEvent = serde_json::from_str(text).unwrap();
        match event {
            ServerEvent::ToolCall(calls) => {
                assert_eq!(calls.function_calls().len(), 2);
                assert_eq!(calls.function_calls()[0].id(), "call-1");
                assert_eq!(calls.function_calls()[1].name(), "edit_task_in_plan");
            }
            other => panic!("expected toolCall, got {:?}", other),
        }
    }

    #[test]
    fn server_content_flags_default_to_false() {
        let text = r#"{"serverContent":{"outputTranscription":{"text":"On it."}}}"#;
        let event: ServerEvent = serde_json::from_str(text).unwrap();
        match event {
            ServerEvent::ServerContent(content) => {
                assert!(!content.interrupted());
                assert!(!content.turn_complete());
                assert_eq!(content.output_transcription().unwrap().text(), "On it.");
            }
            other => panic!("expected serverContent, got {:?}", other),
        }
    }
}
