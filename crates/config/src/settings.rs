//! Typed settings sections

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub stt: SttSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub tts: TtsSettings,
    #[serde(default)]
    pub imagegen: ImageGenSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub personas: PersonaSourceSettings,
    #[serde(default)]
    pub products: ProductsSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub persistence: PersistenceSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.stt.vad_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "stt.vad_threshold".to_string(),
                message: "threshold must be within [0, 1]".to_string(),
            });
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "max_tokens must be positive".to_string(),
            });
        }
        if self.tts.max_buffer_chars < 8 {
            return Err(ConfigError::InvalidValue {
                field: "tts.max_buffer_chars".to_string(),
                message: "buffer threshold too small".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Capacity of the per-session outgoing event queue.
    #[serde(default = "default_outgoing_queue")]
    pub outgoing_queue: usize,
    /// Per-connection inbound budget: messages per second.
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,
    /// Per-connection inbound budget: audio bytes per second.
    #[serde(default = "default_audio_bytes_per_second")]
    pub audio_bytes_per_second: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_sessions() -> usize {
    100
}
fn default_session_timeout_secs() -> u64 {
    3600
}
fn default_cleanup_interval_secs() -> u64 {
    300
}
fn default_outgoing_queue() -> usize {
    256
}
fn default_messages_per_second() -> u32 {
    50
}
fn default_audio_bytes_per_second() -> usize {
    64 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            outgoing_queue: default_outgoing_queue(),
            messages_per_second: default_messages_per_second(),
            audio_bytes_per_second: default_audio_bytes_per_second(),
        }
    }
}

/// Streaming speech-to-text settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttSettings {
    #[serde(default = "default_stt_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
}

fn default_stt_url() -> String {
    "wss://api.openai.com/v1/realtime?intent=transcription".to_string()
}
fn default_stt_model() -> String {
    "gpt-4o-mini-transcribe".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_vad_threshold() -> f32 {
    0.3
}
fn default_prefix_padding_ms() -> u32 {
    300
}
fn default_silence_duration_ms() -> u32 {
    500
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            url: default_stt_url(),
            api_key: String::new(),
            model: default_stt_model(),
            language: default_language(),
            vad_threshold: default_vad_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

/// Chat-completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_penalty")]
    pub presence_penalty: f32,
    #[serde(default = "default_penalty")]
    pub frequency_penalty: f32,
    /// Wall-clock deadline for one completion stream.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_penalty() -> f32 {
    0.1
}
fn default_turn_timeout_secs() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            presence_penalty: default_penalty(),
            frequency_penalty: default_penalty(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

/// Streaming text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_voice")]
    pub default_voice_id: String,
    /// Buffer length that forces a flush even mid-sentence.
    #[serde(default = "default_max_buffer_chars")]
    pub max_buffer_chars: usize,
}

fn default_tts_endpoint() -> String {
    "https://api.elevenlabs.io".to_string()
}
fn default_tts_model() -> String {
    "eleven_flash_v2_5".to_string()
}
fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}
fn default_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}
fn default_max_buffer_chars() -> usize {
    120
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            api_key: String::new(),
            model_id: default_tts_model(),
            output_format: default_output_format(),
            default_voice_id: default_voice(),
            max_buffer_chars: default_max_buffer_chars(),
        }
    }
}

/// Image/style generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenSettings {
    #[serde(default = "default_imagegen_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tryon_model")]
    pub tryon_model: String,
    #[serde(default = "default_edit_model")]
    pub edit_model: String,
}

fn default_imagegen_endpoint() -> String {
    "https://fal.run".to_string()
}
fn default_tryon_model() -> String {
    "fal-ai/fashn/tryon".to_string()
}
fn default_edit_model() -> String {
    "fal-ai/flux/dev/image-to-image".to_string()
}

impl Default for ImageGenSettings {
    fn default() -> Self {
        Self {
            endpoint: default_imagegen_endpoint(),
            api_key: String::new(),
            tryon_model: default_tryon_model(),
            edit_model: default_edit_model(),
        }
    }
}

/// Persistent object storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub public_base_url: String,
}

fn default_bucket() -> String {
    "avatar-assets".to_string()
}

/// Persona source settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersonaSourceSettings {
    /// REST endpoint serving persona records; empty means the static
    /// in-process source is used.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

/// Product surface settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductsSettings {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

/// Agent behavior settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentSettings {
    /// Run one proactive greeting turn when a session connects.
    #[serde(default)]
    pub proactive_greeting: bool,
}

/// Feature flags
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeatureFlags {
    /// Expose the trending-products tool to the LLM.
    #[serde(default)]
    pub product_purchase: bool,
}

/// ScyllaDB persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_keyspace() -> String {
    "avatar_pipeline".to_string()
}
fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Logging/metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines (production default).
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_enabled() -> bool {
    true
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}
