use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use planvoice_types::audio::{Base64EncodedAudioBytes, INPUT_AUDIO_MIME_TYPE};
use planvoice_types::events::client::{
    ClientContentEvent, FunctionResponse, RealtimeInputEvent, SetupEvent, ToolResponseEvent,
};
use planvoice_types::tools::plan_function_declarations;
use planvoice_types::{Blob, ClientEvent, ServerEvent};

use crate::error::SessionError;

pub mod config;
mod consts;
mod utils;

pub use config::Config;

pub type ClientTx = tokio::sync::mpsc::Sender<ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

/// Lifecycle of the single live transport owned by a `Client`.
/// `Closed` means the remote side ended the stream; `disconnect` returns the
/// client to `Idle` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Closed,
    Error,
}

/// Owns the websocket connection to the live endpoint: a send task fed by an
/// mpsc channel and a receive task that demultiplexes inbound messages onto a
/// broadcast channel. Routing carries no business logic; downstream
/// components subscribe via `server_events`.
pub struct Client {
    capacity: usize,
    config: Config,
    state_tx: Arc<tokio::sync::watch::Sender<ConnectionState>>,
    state_rx: tokio::sync::watch::Receiver<ConnectionState>,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    recv_handle: Option<tokio::task::JoinHandle<()>>,
    err_tx: tokio::sync::mpsc::Sender<SessionError>,
}

impl Client {
    pub fn new(
        config: Config,
        capacity: usize,
        err_tx: tokio::sync::mpsc::Sender<SessionError>,
    ) -> Self {
        let (state_tx, state_rx) = tokio::sync::watch::channel(ConnectionState::Idle);
        Self {
            capacity,
            config,
            state_tx: Arc::new(state_tx),
            state_rx,
            c_tx: None,
            s_tx: None,
            recv_handle: None,
            err_tx,
        }
    }

    /// Opens the transport and performs the setup handshake. A configured API
    /// key is a hard precondition checked before any network attempt. On any
    /// failure the state is `Error` and no channel survives. Reconnecting
    /// tears the previous transport down first.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.c_tx.is_some() {
            tracing::info!("reconnecting: tearing down previous transport");
            self.disconnect();
        }

        let request = match utils::build_request(&self.config) {
            Ok(request) => request,
            Err(e) => {
                self.set_state(ConnectionState::Error);
                self.report(&e);
                return Err(e);
            }
        };

        self.set_state(ConnectionState::Connecting);
        let (ws_stream, _) = match tokio_tungstenite::connect_async(request).await {
            Ok(connected) => connected,
            Err(e) => {
                self.set_state(ConnectionState::Error);
                let e = SessionError::Transport(format!("failed to connect: {e}"));
                self.report(&e);
                return Err(e);
            }
        };

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
        });

        let broadcast = s_tx.clone();
        let state_tx = self.state_tx.clone();
        let err_tx = self.err_tx.clone();
        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        state_tx.send_replace(ConnectionState::Error);
                        let _ = err_tx
                            .try_send(SessionError::Transport(format!("stream failed: {e}")));
                        return;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if let Err(e) = broadcast.send(event) {
                                tracing::error!("failed to broadcast event: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }
            // Only mark Closed if nothing else already moved the state on.
            state_tx.send_if_modified(|state| {
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Closed;
                    true
                } else {
                    false
                }
            });
        });

        self.c_tx = Some(c_tx.clone());
        self.s_tx = Some(s_tx);
        self.recv_handle = Some(recv_handle);

        let setup = SetupEvent::new(self.config.model())
            .with_system_instruction(self.config.system_instruction())
            .with_function_declarations(plan_function_declarations());
        if let Err(e) = c_tx.send(ClientEvent::Setup(setup)).await {
            self.disconnect();
            self.set_state(ConnectionState::Error);
            let e = SessionError::Transport(format!("failed to send setup: {e}"));
            self.report(&e);
            return Err(e);
        }

        self.set_state(ConnectionState::Connected);
        tracing::info!("live session connected, model={}", self.config.model());
        Ok(())
    }

    /// Closes the transport if open. Safe to call any number of times and in
    /// any state; always leaves the client `Idle`.
    pub fn disconnect(&mut self) {
        self.c_tx = None;
        self.s_tx = None;
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
        self.set_state(ConnectionState::Idle);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_watch(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn server_events(&self) -> Result<ServerRx, SessionError> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(SessionError::Transport("not connected yet".to_string())),
        }
    }

    /// Cloneable handle used by background tasks to push outbound events.
    pub fn handle(&self) -> Option<ClientHandle> {
        self.c_tx.clone().map(|c_tx| ClientHandle { c_tx })
    }

    /// Fire-and-forget; a no-op when not connected. Called from the audio
    /// encode path, so it must never block.
    pub fn send_audio_chunk(&self, encoded: Base64EncodedAudioBytes) {
        if let Some(handle) = self.handle() {
            handle.send_audio_chunk(encoded);
        }
    }

    /// Sends a typed text turn. Requires a connected state and non-empty text.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput("empty text message".to_string()));
        }
        let tx = match (self.state(), &self.c_tx) {
            (ConnectionState::Connected, Some(tx)) => tx,
            _ => return Err(SessionError::Transport("not connected".to_string())),
        };
        tx.send(ClientEvent::ClientContent(ClientContentEvent::user_turn(
            text,
        )))
        .await
        .map_err(|e| SessionError::Transport(format!("failed to send text: {e}")))
    }

    /// Fire-and-forget tool result, correlated by call id. The dispatcher
    /// guarantees exactly one of these per received function call.
    pub fn send_tool_result(&self, response: FunctionResponse) {
        match self.handle() {
            Some(handle) => handle.send_tool_result(response),
            None => tracing::warn!("dropping tool result: not connected"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn report(&self, e: &SessionError) {
        tracing::error!("{}", e);
        let _ = self.err_tx.try_send(e.clone());
    }
}

/// Cheap clone of the outbound event channel, for tasks that outlive a
/// borrow of the `Client`.
#[derive(Clone)]
pub struct ClientHandle {
    c_tx: ClientTx,
}

impl ClientHandle {
    #[cfg(test)]
    pub(crate) fn for_tests(c_tx: ClientTx) -> Self {
        Self { c_tx }
    }

    pub fn send_audio_chunk(&self, encoded: Base64EncodedAudioBytes) {
        let event = ClientEvent::RealtimeInput(RealtimeInputEvent::new(vec![Blob::new(
            INPUT_AUDIO_MIME_TYPE,
            encoded,
        )]));
        if let Err(e) = self.c_tx.try_send(event) {
            tracing::warn!("failed to queue audio chunk: {}", e);
        }
    }

    pub fn send_tool_result(&self, response: FunctionResponse) {
        let event = ClientEvent::ToolResponse(ToolResponseEvent::new(vec![response]));
        if let Err(e) = self.c_tx.try_send(event) {
            tracing::warn!("failed to queue tool result: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_without_key() -> (Client, tokio::sync::mpsc::Receiver<SessionError>) {
        let (err_tx, err_rx) = tokio::sync::mpsc::channel(8);
        let config = Config::builder().build();
        (Client::new(config, 16, err_tx), err_rx)
    }

    #[tokio::test]
    async fn connect_without_credential_fails_before_any_network_attempt() {
        let (mut client, mut err_rx) = client_without_key();
        let result = client.connect().await;
        assert!(matches!(result, Err(SessionError::Configuration(_))));
        assert_eq!(client.state(), ConnectionState::Error);
        // No transport was opened, so there is nothing to subscribe to.
        assert!(client.server_events().is_err());
        assert!(err_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (mut client, _err_rx) = client_without_key();
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Idle);

        // Even after a failed connect, disconnect settles back to Idle.
        let _ = client.connect().await;
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn audio_chunks_are_dropped_when_not_connected() {
        let (client, _err_rx) = client_without_key();
        // Must not panic or error; fire-and-forget is a no-op here.
        client.send_audio_chunk("AAAA".to_string());
        assert!(client.send_text("hello").await.is_err());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_as_invalid_input() {
        let (client, _err_rx) = client_without_key();
        assert!(matches!(
            client.send_text("   ").await,
            Err(SessionError::InvalidInput(_))
        ));
    }
}
