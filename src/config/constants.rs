// Project-wide constants
//
// Centralised here so endpoints, env var names and file names have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Default OpenAI-compatible chat-completion endpoint.
pub const DEFAULT_BASE_URL: &str = "https://chat-ai.academiccloud.de/v1";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "meta-llama-3.1-8b-instruct";

/// Default maximum tokens per completion request.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Network timeout for a single completion request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default bind address for the HTTP transport.
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:50051";

/// Comma separated credential pool.
pub const ENV_API_KEYS: &str = "LOOPER_API_KEYS";

/// Single credential.
pub const ENV_API_KEY: &str = "LOOPER_API_KEY";

/// Config file override.
pub const ENV_CONFIG_PATH: &str = "LOOPER_CONFIG";

/// Key file looked up in the working directory, one key per line.
pub const KEY_FILE_NAME: &str = ".looper-keys";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "looper.toml";
