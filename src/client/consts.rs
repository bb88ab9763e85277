pub const PLANVOICE_API_KEY: &str = "PLANVOICE_API_KEY";

pub const BASE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

pub const API_KEY_QUERY: &str = "key";
