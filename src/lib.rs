mod capture;
mod client;
mod dispatch;
mod error;
mod playback;
mod session;
mod transcript;

pub use planvoice_types as types;
pub use planvoice_utils as utils;

pub use capture::CapturePipeline;
pub use client::config::ConfigBuilder;
pub use client::{Client, ClientHandle, Config, ConnectionState, ServerRx};
pub use dispatch::{PlanFunction, PlanStore, ToolDispatcher};
pub use error::SessionError;
pub use playback::{PlaybackEngine, PlaybackScheduler};
pub use session::LiveSession;
pub use transcript::{ConversationMessage, Speaker, TranscriptLog};
