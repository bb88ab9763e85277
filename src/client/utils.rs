use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;
use crate::client::consts::API_KEY_QUERY;
use crate::error::SessionError;

/// Builds the websocket handshake request. The API key leaves its secrecy
/// wrapper only here, as a query parameter on the connection URL.
pub fn build_request(config: &Config) -> Result<Request, SessionError> {
    let api_key = config
        .api_key()
        .ok_or_else(|| SessionError::Configuration("no API key configured".to_string()))?;
    let url = format!(
        "{}?{}={}",
        config.base_url(),
        API_KEY_QUERY,
        api_key.expose_secret()
    );
    url.into_client_request()
        .map_err(|e| SessionError::Transport(format!("invalid request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_requires_an_api_key() {
        let config = Config::builder().build();
        match build_request(&config) {
            Err(SessionError::Configuration(msg)) => assert!(msg.contains("API key")),
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn request_carries_the_key_as_query_parameter() {
        let config = Config::builder()
            .with_base_url("wss://example.test/live")
            .with_api_key("secret-key")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().query(), Some("key=secret-key"));
    }
}
