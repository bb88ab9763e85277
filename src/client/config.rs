use secrecy::SecretString;

use crate::client::consts::{BASE_URL, DEFAULT_MODEL, PLANVOICE_API_KEY};

/// Connection settings for one live session. Constructed explicitly and
/// injected at session creation; there is no module-level fallback. A missing
/// API key is detected in `connect` before any network attempt.
#[derive(Clone)]
pub struct Config {
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    system_instruction: String,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.config.system_instruction = instruction.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl Config {
    /// Reads the API key and optional overrides from the environment.
    /// A missing key leaves `api_key` unset rather than failing here, so the
    /// caller sees the configuration error at `connect` time.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut builder = Config::builder();
        if let Ok(key) = std::env::var(PLANVOICE_API_KEY) {
            builder = builder.with_api_key(&key);
        }
        if let Ok(model) = std::env::var("PLANVOICE_MODEL") {
            builder = builder.with_model(&model);
        }
        if let Ok(base_url) = std::env::var("PLANVOICE_BASE_URL") {
            builder = builder.with_base_url(&base_url);
        }
        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }
}

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a voice assistant for a project planning app. \
You can add tasks to the plan, edit existing tasks, and mark subtasks as completed \
by calling the declared functions. Keep spoken replies short and confirm each change you make.";
