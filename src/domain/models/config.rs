use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Colloquy.
///
/// Every section carries serde defaults so a missing or partial config file
/// still yields a runnable configuration; values mirror the tuning the
/// moderation pipeline was built around.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub moderator: ModeratorConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Identity of the assistant persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModeratorConfig {
    /// Name speakers use to address the assistant; also the speaker id on
    /// synthesized replies.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
}

fn default_assistant_name() -> String {
    "sage".to_string()
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
        }
    }
}

/// Context aggregator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregatorConfig {
    /// Blocking-pop timeout on the context queue.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Elapsed time since the oldest buffered utterance that forces a
    /// summarization cycle.
    #[serde(default = "default_summary_window_secs")]
    pub summary_window_secs: u64,

    /// Messages since the last inference that force a topic-inference cycle.
    #[serde(default = "default_topic_message_interval")]
    pub topic_message_interval: usize,

    /// Elapsed seconds since the last inference that force a cycle.
    #[serde(default = "default_topic_time_interval_secs")]
    pub topic_time_interval_secs: u64,

    /// Silence threshold used for the derived snapshot.
    #[serde(default = "default_silence_threshold_secs")]
    pub silence_threshold_secs: f64,

    /// Synthesized-history entries exposed in published context views.
    #[serde(default = "default_synthesized_view_limit")]
    pub synthesized_view_limit: usize,
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_summary_window_secs() -> u64 {
    120
}

const fn default_topic_message_interval() -> usize {
    5
}

const fn default_topic_time_interval_secs() -> u64 {
    30
}

const fn default_silence_threshold_secs() -> f64 {
    4.0
}

const fn default_synthesized_view_limit() -> usize {
    5
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            summary_window_secs: default_summary_window_secs(),
            topic_message_interval: default_topic_message_interval(),
            topic_time_interval_secs: default_topic_time_interval_secs(),
            silence_threshold_secs: default_silence_threshold_secs(),
            synthesized_view_limit: default_synthesized_view_limit(),
        }
    }
}

impl AggregatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn summary_window(&self) -> Duration {
        Duration::from_secs(self.summary_window_secs)
    }

    pub fn topic_time_interval(&self) -> Duration {
        Duration::from_secs(self.topic_time_interval_secs)
    }

    pub fn silence_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.silence_threshold_secs)
    }
}

/// Decision pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Bounded wait-for-more-context: time bound.
    #[serde(default = "default_context_wait_secs")]
    pub context_wait_secs: u64,

    /// Bounded wait-for-more-context: new-message bound.
    #[serde(default = "default_context_wait_messages")]
    pub context_wait_messages: usize,

    /// Blocking-pop timeout on the trigger queue and the wait-poll cadence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quiet period before the background scan starts.
    #[serde(default = "default_background_startup_delay_secs")]
    pub background_startup_delay_secs: u64,

    /// Interval between background scans.
    #[serde(default = "default_background_interval_secs")]
    pub background_interval_secs: u64,

    /// Fan-out cap for per-domain perspective generation.
    #[serde(default = "default_max_perspectives")]
    pub max_perspectives: usize,

    /// Synthesized-history age considered by deduplication.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
}

const fn default_context_wait_secs() -> u64 {
    5
}

const fn default_context_wait_messages() -> usize {
    5
}

const fn default_background_startup_delay_secs() -> u64 {
    120
}

const fn default_background_interval_secs() -> u64 {
    90
}

const fn default_max_perspectives() -> usize {
    2
}

const fn default_dedup_window_secs() -> u64 {
    300
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_wait_secs: default_context_wait_secs(),
            context_wait_messages: default_context_wait_messages(),
            poll_interval_ms: default_poll_interval_ms(),
            background_startup_delay_secs: default_background_startup_delay_secs(),
            background_interval_secs: default_background_interval_secs(),
            max_perspectives: default_max_perspectives(),
            dedup_window_secs: default_dedup_window_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn context_wait(&self) -> Duration {
        Duration::from_secs(self.context_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn background_startup_delay(&self) -> Duration {
        Duration::from_secs(self.background_startup_delay_secs)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

/// Delivery scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Silence threshold gating non-immediate delivery; also the minimum
    /// spacing between two non-P0 deliveries.
    #[serde(default = "default_silence_threshold_secs")]
    pub silence_threshold_secs: f64,

    /// Soft delivery deadline for P1 items.
    #[serde(default = "default_p1_target_secs")]
    pub p1_target_secs: u64,

    /// Soft delivery deadline for P2/P3 items.
    #[serde(default = "default_p2_p3_target_secs")]
    pub p2_p3_target_secs: u64,

    /// Hard TTL for P1-P3 items.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,

    /// Early-release fraction of the P1 soft deadline.
    #[serde(default = "default_p1_early_release")]
    pub p1_early_release: f64,

    /// TTL of the "spoke" follow-up flag set on delivery.
    #[serde(default = "default_spoke_ttl_secs")]
    pub spoke_ttl_secs: u64,
}

const fn default_tick_interval_ms() -> u64 {
    500
}

const fn default_p1_target_secs() -> u64 {
    30
}

const fn default_p2_p3_target_secs() -> u64 {
    90
}

const fn default_expiration_secs() -> u64 {
    120
}

const fn default_p1_early_release() -> f64 {
    0.7
}

const fn default_spoke_ttl_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            silence_threshold_secs: default_silence_threshold_secs(),
            p1_target_secs: default_p1_target_secs(),
            p2_p3_target_secs: default_p2_p3_target_secs(),
            expiration_secs: default_expiration_secs(),
            p1_early_release: default_p1_early_release(),
            spoke_ttl_secs: default_spoke_ttl_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn silence_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.silence_threshold_secs)
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }

    pub fn spoke_ttl(&self) -> Duration {
        Duration::from_secs(self.spoke_ttl_secs)
    }
}

/// Bus state-blob TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// TTL of the full per-session context view.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// TTL of the derived silence snapshot.
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
}

const fn default_state_ttl_secs() -> u64 {
    3600
}

const fn default_snapshot_ttl_secs() -> u64 {
    10
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl_secs(),
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
        }
    }
}

impl BusConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

/// Language-model client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// API key; falls back to the `ANTHROPIC_API_KEY` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model for summaries, decisions, and perspectives.
    #[serde(default = "default_model")]
    pub model: String,

    /// Cheaper model for classification calls.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_fast_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

const fn default_model_timeout_secs() -> u64 {
    120
}

const fn default_requests_per_second() -> f64 {
    10.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            fast_model: default_fast_model(),
            timeout_secs: default_model_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy configuration for the model client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    10_000
}

const fn default_max_backoff_ms() -> u64 {
    300_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Summary-store database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".colloquy/colloquy.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for rolling file output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// Session registry lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Idle time after which per-session state is evicted.
    #[serde(default = "default_idle_evict_secs")]
    pub idle_evict_secs: u64,
}

const fn default_idle_evict_secs() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_evict_secs: default_idle_evict_secs(),
        }
    }
}

impl SessionConfig {
    pub fn idle_evict(&self) -> Duration {
        Duration::from_secs(self.idle_evict_secs)
    }
}
