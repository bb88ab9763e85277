//! The live assistant session: one duplexed voice conversation attached to a
//! project. Owns the connection manager, the capture and playback pipelines,
//! the transcript log, and the tool-call dispatcher, and routes every inbound
//! server event to the right component.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rubato::{FastFixedIn, Resampler};

use planvoice_types::events::client::FunctionResponse;
use planvoice_types::ServerEvent;
use planvoice_utils::audio::{LIVE_API_INPUT_SAMPLE_RATE, LIVE_API_OUTPUT_SAMPLE_RATE};

use crate::capture::{CapturePipeline, INPUT_CHUNK_SIZE};
use crate::client::{Client, ClientHandle, Config, ConnectionState};
use crate::dispatch::{PlanStore, ToolDispatcher};
use crate::error::SessionError;
use crate::playback::{PlaybackEngine, PlaybackScheduler};
use crate::transcript::{ConversationMessage, Speaker, TranscriptLog};

const EVENT_CAPACITY: usize = 1024;
const ERROR_CAPACITY: usize = 64;

pub struct LiveSession {
    client: Client,
    capture: CapturePipeline,
    playback: Option<PlaybackEngine>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    transcript: Arc<Mutex<TranscriptLog>>,
    store: Arc<dyn PlanStore>,
    err_tx: tokio::sync::mpsc::Sender<SessionError>,
    err_rx: Option<tokio::sync::mpsc::Receiver<SessionError>>,
    route_handle: Option<tokio::task::JoinHandle<()>>,
    encode_handle: Option<tokio::task::JoinHandle<()>>,
    encode_live: Option<Arc<AtomicBool>>,
}

impl LiveSession {
    pub fn new(config: Config, store: Arc<dyn PlanStore>) -> Self {
        let (err_tx, err_rx) = tokio::sync::mpsc::channel(ERROR_CAPACITY);
        Self {
            client: Client::new(config, EVENT_CAPACITY, err_tx.clone()),
            capture: CapturePipeline::new(),
            playback: None,
            scheduler: Arc::new(Mutex::new(PlaybackScheduler::new(
                LIVE_API_OUTPUT_SAMPLE_RATE as u32,
            ))),
            transcript: Arc::new(Mutex::new(TranscriptLog::new())),
            store,
            err_tx,
            err_rx: Some(err_rx),
            route_handle: None,
            encode_handle: None,
            encode_live: None,
        }
    }

    /// Opens the live transport and starts routing inbound events. Any
    /// previous transport and audio resources are fully torn down first; a
    /// session never holds two.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.teardown();
        self.client.connect().await?;

        // A missing speaker degrades the session (transcripts and tools still
        // work) rather than failing the connect.
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let consumed = Arc::new(AtomicU64::new(0));
        let output_rate = match PlaybackEngine::start(None, queue.clone(), consumed.clone()) {
            Ok(engine) => {
                let rate = engine.sample_rate();
                self.playback = Some(engine);
                rate
            }
            Err(e) => {
                self.report(e);
                LIVE_API_OUTPUT_SAMPLE_RATE as u32
            }
        };
        self.scheduler = Arc::new(Mutex::new(PlaybackScheduler::with_shared(
            output_rate,
            queue,
            consumed,
        )));

        let mut server_events = self.client.server_events()?;
        let mut router = Router::new(
            self.client.handle(),
            self.scheduler.clone(),
            self.transcript.clone(),
            ToolDispatcher::new(self.store.clone()),
            self.err_tx.clone(),
            output_rate,
        );
        self.route_handle = Some(tokio::spawn(async move {
            while let Ok(event) = server_events.recv().await {
                router.handle_event(event);
            }
            tracing::info!("server event stream ended");
        }));
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn state_watch(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.client.state_watch()
    }

    pub fn is_listening(&self) -> bool {
        self.capture.is_capturing()
    }

    /// Acquires the microphone and starts streaming encoded chunks to the
    /// live endpoint. Requires a connected session; failure leaves the
    /// session connected and `start_listening` retryable.
    pub fn start_listening(&mut self) -> Result<(), SessionError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(SessionError::Transport(
                "cannot listen: not connected".to_string(),
            ));
        }
        if self.capture.is_capturing() {
            return Err(SessionError::Capture("already listening".to_string()));
        }
        let handle = self
            .client
            .handle()
            .ok_or_else(|| SessionError::Transport("not connected".to_string()))?;

        let (audio_tx, audio_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(EVENT_CAPACITY);
        self.capture.start(None, audio_tx)?;
        let device_rate = self
            .capture
            .sample_rate()
            .unwrap_or(LIVE_API_INPUT_SAMPLE_RATE as u32);

        let live = Arc::new(AtomicBool::new(true));
        self.encode_live = Some(live.clone());
        self.encode_handle = Some(tokio::spawn(encode_and_forward(
            audio_rx,
            handle,
            device_rate,
            live,
        )));
        tracing::info!("listening started, device_rate={}", device_rate);
        Ok(())
    }

    /// Releases the microphone. No audio is captured or sent after this
    /// returns: the capture gate stops new blocks, the live flag makes the
    /// encode task discard anything still buffered, and the task is aborted.
    pub fn stop_listening(&mut self) {
        self.capture.stop();
        if let Some(live) = self.encode_live.take() {
            live.store(false, Ordering::Release);
        }
        if let Some(handle) = self.encode_handle.take() {
            handle.abort();
        }
    }

    /// Sends a typed message as a fresh user turn. Open transcript entries
    /// are finalized first so accumulation never spans unrelated turns.
    pub async fn send_text_message(&mut self, text: &str) -> Result<(), SessionError> {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.finalize_open();
            transcript.apply_partial(Speaker::User, text);
            transcript.finalize_open();
        }
        self.client.send_text(text).await
    }

    pub fn user_transcript(&self) -> String {
        self.transcript
            .lock()
            .map(|t| t.open_text(Speaker::User))
            .unwrap_or_default()
    }

    pub fn ai_transcript(&self) -> String {
        self.transcript
            .lock()
            .map(|t| t.open_text(Speaker::Ai))
            .unwrap_or_default()
    }

    pub fn conversation(&self) -> Vec<ConversationMessage> {
        self.transcript
            .lock()
            .map(|t| t.messages().to_vec())
            .unwrap_or_default()
    }

    /// One-shot receiver for session errors, for the embedding UI.
    pub fn take_error_receiver(
        &mut self,
    ) -> Option<tokio::sync::mpsc::Receiver<SessionError>> {
        self.err_rx.take()
    }

    /// Full teardown: microphone released, transport closed, playback flushed
    /// and the output device dropped, cursor reset. Safe from every exit path.
    pub fn close(&mut self) {
        self.teardown();
        self.client.disconnect();
    }

    fn teardown(&mut self) {
        self.stop_listening();
        if let Some(handle) = self.route_handle.take() {
            handle.abort();
        }
        if let Ok(mut scheduler) = self.scheduler.lock() {
            scheduler.interrupt();
        }
        self.playback = None;
    }

    fn report(&self, e: SessionError) {
        tracing::error!("{}", e);
        let _ = self.err_tx.try_send(e);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Demultiplexes one inbound server event to the owning component. Factored
/// out of the routing task so the behavior is testable without a transport.
struct Router<S: PlanStore> {
    handle: Option<ClientHandle>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    transcript: Arc<Mutex<TranscriptLog>>,
    dispatcher: ToolDispatcher<S>,
    err_tx: tokio::sync::mpsc::Sender<SessionError>,
    out_resampler: Option<FastFixedIn<f32>>,
}

impl<S: PlanStore> Router<S> {
    fn new(
        handle: Option<ClientHandle>,
        scheduler: Arc<Mutex<PlaybackScheduler>>,
        transcript: Arc<Mutex<TranscriptLog>>,
        dispatcher: ToolDispatcher<S>,
        err_tx: tokio::sync::mpsc::Sender<SessionError>,
        output_rate: u32,
    ) -> Self {
        let out_resampler = if output_rate == LIVE_API_OUTPUT_SAMPLE_RATE as u32 {
            None
        } else {
            planvoice_utils::audio::create_resampler(
                LIVE_API_OUTPUT_SAMPLE_RATE,
                output_rate as f64,
                crate::playback::OUTPUT_CHUNK_SIZE,
            )
            .inspect_err(|e| tracing::error!("failed to create output resampler: {}", e))
            .ok()
        };
        Self {
            handle,
            scheduler,
            transcript,
            dispatcher,
            err_tx,
            out_resampler,
        }
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SetupComplete(_) => {
                tracing::info!("setup complete");
            }
            ServerEvent::ServerContent(content) => {
                if content.interrupted() {
                    if let Ok(mut scheduler) = self.scheduler.lock() {
                        scheduler.interrupt();
                    }
                }
                if let Some(turn) = content.model_turn() {
                    for part in turn.parts() {
                        if let Some(blob) = part.as_inline_data() {
                            self.play(planvoice_utils::audio::decode(blob.data()));
                        }
                    }
                }
                if let Ok(mut transcript) = self.transcript.lock() {
                    if let Some(fragment) = content.input_transcription() {
                        transcript.apply_partial(Speaker::User, fragment.text());
                    }
                    if let Some(fragment) = content.output_transcription() {
                        transcript.apply_partial(Speaker::Ai, fragment.text());
                    }
                    if content.turn_complete() {
                        transcript.finalize_open();
                    }
                }
            }
            ServerEvent::ToolCall(batch) => {
                let outcome = self.dispatcher.dispatch_batch(batch.function_calls());
                for response in outcome.responses {
                    self.respond(response);
                }
                if let Ok(mut transcript) = self.transcript.lock() {
                    for notice in &outcome.notices {
                        transcript.push_system(notice.clone());
                    }
                    for e in &outcome.errors {
                        transcript.push_system(format!("Error: {e}"));
                    }
                }
                for e in outcome.errors {
                    let _ = self.err_tx.try_send(e);
                }
            }
            ServerEvent::GoAway(notice) => {
                tracing::info!("server going away: {:?}", notice.time_left());
            }
        }
    }

    fn play(&mut self, samples: Vec<f32>) {
        let samples = match self.out_resampler.as_mut() {
            Some(resampler) => {
                let chunk_size = resampler.input_frames_next();
                let mut resampled = Vec::with_capacity(samples.len());
                for chunk in planvoice_utils::audio::split_for_chunks(&samples, chunk_size) {
                    if let Ok(out) = resampler.process(&[chunk.as_slice()], None) {
                        if let Some(out) = out.first() {
                            resampled.extend_from_slice(out);
                        }
                    }
                }
                resampled
            }
            None => samples,
        };
        if samples.is_empty() {
            return;
        }
        if let Ok(mut scheduler) = self.scheduler.lock() {
            scheduler.schedule(&samples);
        }
    }

    fn respond(&self, response: FunctionResponse) {
        match &self.handle {
            Some(handle) => handle.send_tool_result(response),
            None => tracing::warn!("dropping tool result: not connected"),
        }
    }
}

/// Buffers mono blocks from the capture callback, resamples them to the wire
/// rate, and forwards each encoded chunk fire-and-forget. Ends when `live`
/// is cleared or the capture side closes the channel; once `live` is false,
/// blocks still buffered in the channel are discarded, never sent.
async fn encode_and_forward(
    mut audio_rx: tokio::sync::mpsc::Receiver<Vec<f32>>,
    handle: ClientHandle,
    device_rate: u32,
    live: Arc<AtomicBool>,
) {
    let mut in_resampler = if device_rate == LIVE_API_INPUT_SAMPLE_RATE as u32 {
        None
    } else {
        match planvoice_utils::audio::create_resampler(
            device_rate as f64,
            LIVE_API_INPUT_SAMPLE_RATE,
            INPUT_CHUNK_SIZE,
        ) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                tracing::error!("failed to create input resampler: {}", e);
                return;
            }
        }
    };

    let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);
    while let Some(audio) = audio_rx.recv().await {
        if !live.load(Ordering::Acquire) {
            break;
        }
        buffer.extend(audio);
        let mut resampled: Vec<f32> = vec![];
        while buffer.len() >= INPUT_CHUNK_SIZE {
            let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
            match in_resampler.as_mut() {
                Some(resampler) => {
                    if let Ok(out) = resampler.process(&[chunk.as_slice()], None) {
                        if let Some(out) = out.first() {
                            resampled.extend(out.iter().copied());
                        }
                    }
                }
                None => resampled.extend(chunk),
            }
        }
        if resampled.is_empty() || !live.load(Ordering::Acquire) {
            continue;
        }
        handle.send_audio_chunk(planvoice_utils::audio::encode(&resampled));
    }
    tracing::debug!("capture channel closed, encode task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MockPlanStore;
    use planvoice_types::plan::{Priority, Status, Subtask, Task};
    use planvoice_types::ClientEvent;

    fn test_router(
        store: MockPlanStore,
    ) -> (
        Router<MockPlanStore>,
        tokio::sync::mpsc::Receiver<ClientEvent>,
        tokio::sync::mpsc::Receiver<SessionError>,
    ) {
        let (c_tx, c_rx) = tokio::sync::mpsc::channel(64);
        let (err_tx, err_rx) = tokio::sync::mpsc::channel(64);
        let router = Router::new(
            Some(ClientHandle::for_tests(c_tx)),
            Arc::new(Mutex::new(PlaybackScheduler::new(
                LIVE_API_OUTPUT_SAMPLE_RATE as u32,
            ))),
            Arc::new(Mutex::new(TranscriptLog::new())),
            ToolDispatcher::new(store),
            err_tx,
            LIVE_API_OUTPUT_SAMPLE_RATE as u32,
        );
        (router, c_rx, err_rx)
    }

    fn event(json: &str) -> ServerEvent {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn transcription_fragments_reach_the_log_and_hand_off() {
        let (mut router, _c_rx, _err_rx) = test_router(MockPlanStore::new());
        router.handle_event(event(
            r#"{"serverContent":{"inputTranscription":{"text":"Add a"}}}"#,
        ));
        router.handle_event(event(
            r#"{"serverContent":{"inputTranscription":{"text":"Add a task"}}}"#,
        ));
        router.handle_event(event(
            r#"{"serverContent":{"outputTranscription":{"text":"Adding it"}}}"#,
        ));

        let transcript = router.transcript.lock().unwrap();
        let messages = transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "Add a task");
        assert!(messages[0].is_final);
        assert_eq!(messages[1].text, "Adding it");
        assert!(!messages[1].is_final);
    }

    #[tokio::test]
    async fn turn_complete_finalizes_the_open_entry() {
        let (mut router, _c_rx, _err_rx) = test_router(MockPlanStore::new());
        router.handle_event(event(
            r#"{"serverContent":{"outputTranscription":{"text":"Done."}}}"#,
        ));
        router.handle_event(event(r#"{"serverContent":{"turnComplete":true}}"#));

        let transcript = router.transcript.lock().unwrap();
        assert!(transcript.messages()[0].is_final);
        assert_eq!(transcript.open_text(Speaker::Ai), "");
    }

    #[tokio::test]
    async fn interruption_flushes_scheduled_playback() {
        let (mut router, _c_rx, _err_rx) = test_router(MockPlanStore::new());
        {
            let mut scheduler = router.scheduler.lock().unwrap();
            scheduler.schedule(&vec![0.1; 2400]);
            scheduler.schedule(&vec![0.1; 2400]);
            assert!(scheduler.next_time() > 0.0);
        }
        router.handle_event(event(r#"{"serverContent":{"interrupted":true}}"#));

        let mut scheduler = router.scheduler.lock().unwrap();
        assert_eq!(scheduler.active_len(), 0);
        assert_eq!(scheduler.next_time(), 0.0);
    }

    #[tokio::test]
    async fn a_tool_call_batch_yields_one_response_per_call() {
        let mut store = MockPlanStore::new();
        store.expect_current_plan().return_const(vec![Task {
            id: "task-1".to_string(),
            title: "Plan sprint".to_string(),
            description: String::new(),
            priority: Priority::Medium,
            time_estimate: "1h".to_string(),
            status: Status::ToDo,
            subtasks: vec![Subtask {
                id: "sub-1".to_string(),
                text: "Pick dates".to_string(),
                completed: false,
            }],
        }]);
        store.expect_apply().return_const(());

        let (mut router, mut c_rx, mut err_rx) = test_router(store);
        router.handle_event(event(
            r#"{"toolCall":{"functionCalls":[
                {"id":"a","name":"complete_subtask","args":{"taskId":"task-1","subtaskId":"sub-1"}},
                {"id":"b","name":"not_a_function","args":{}}
            ]}}"#,
        ));

        let mut ids = Vec::new();
        for _ in 0..2 {
            match c_rx.try_recv().unwrap() {
                ClientEvent::ToolResponse(response) => {
                    ids.push(response.function_responses()[0].id().to_string());
                }
                other => panic!("expected tool response, got {:?}", other),
            }
        }
        assert_eq!(ids, vec!["a", "b"]);
        assert!(c_rx.try_recv().is_err(), "exactly one response per call");

        // The failed call surfaced on the error channel and in the log.
        assert!(matches!(err_rx.try_recv(), Ok(SessionError::Tool(_))));
        let transcript = router.transcript.lock().unwrap();
        assert!(transcript
            .messages()
            .iter()
            .any(|m| m.speaker == Speaker::System && m.text.contains("Marked subtask")));
        assert!(transcript
            .messages()
            .iter()
            .any(|m| m.speaker == Speaker::System && m.text.contains("unknown function")));
    }

    #[tokio::test]
    async fn live_capture_blocks_are_encoded_and_forwarded() {
        let (audio_tx, audio_rx) = tokio::sync::mpsc::channel(8);
        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(8);
        let live = Arc::new(AtomicBool::new(true));

        audio_tx.send(vec![0.1; INPUT_CHUNK_SIZE]).await.unwrap();
        drop(audio_tx);
        encode_and_forward(
            audio_rx,
            ClientHandle::for_tests(c_tx),
            LIVE_API_INPUT_SAMPLE_RATE as u32,
            live,
        )
        .await;

        match c_rx.try_recv().unwrap() {
            ClientEvent::RealtimeInput(input) => {
                assert_eq!(input.media_chunks().len(), 1);
            }
            other => panic!("expected realtime input, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn blocks_buffered_before_stop_are_never_sent() {
        let (audio_tx, audio_rx) = tokio::sync::mpsc::channel(8);
        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(8);
        let live = Arc::new(AtomicBool::new(true));

        // Blocks already queued when stop_listening clears the flag and the
        // capture side goes away.
        audio_tx.send(vec![0.1; INPUT_CHUNK_SIZE]).await.unwrap();
        audio_tx.send(vec![0.1; INPUT_CHUNK_SIZE]).await.unwrap();
        live.store(false, Ordering::Release);
        drop(audio_tx);

        encode_and_forward(
            audio_rx,
            ClientHandle::for_tests(c_tx),
            LIVE_API_INPUT_SAMPLE_RATE as u32,
            live,
        )
        .await;

        assert!(c_rx.try_recv().is_err(), "no audio may be sent after stop");
    }

    #[tokio::test]
    async fn model_audio_parts_are_scheduled_gaplessly() {
        let (mut router, _c_rx, _err_rx) = test_router(MockPlanStore::new());
        let chunk = planvoice_utils::audio::encode(&vec![0.2; 2400]);
        let json = format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[
                {{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{chunk}"}}}},
                {{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{chunk}"}}}}
            ]}}}}}}"#
        );
        router.handle_event(event(&json));

        let mut scheduler = router.scheduler.lock().unwrap();
        assert_eq!(scheduler.active_len(), 2);
        assert!((scheduler.next_time() - 0.2).abs() < 1e-9);
    }
}
