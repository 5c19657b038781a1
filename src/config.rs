use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TameConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub models: ModelsConfig,
    pub memory: MemoryConfig,
    pub embedding: EmbeddingConfig,
    pub detection: DetectionConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for a per-run debug log file. Disabled when unset.
    pub file_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub memory_root: String,
    pub data_root: String,
    pub results_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Model shortcut (e.g. `qwenvl`) or full model id.
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
    pub max_image_side: u32,
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelsConfig {
    /// Short name → full model id.
    pub shortcuts: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub dynamic_max_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionConfig {
    /// `"none"` (always fall back to the whole image) or `"http"`.
    pub provider: String,
    pub endpoint: String,
    pub labels: Vec<String>,
    pub text_threshold: f32,
    pub nms_iou: f32,
    pub redundancy_iou: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub image_weight: f32,
    pub text_weight: f32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file_dir: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_root: "memory".into(),
            data_root: "data/concept".into(),
            results_dir: "results".into(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "qwenvl".into(),
            base_url: "http://localhost:8000".into(),
            api_key: None,
            max_tokens: 1024,
            temperature: None,
            timeout_secs: 300,
            max_image_side: 640,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 20_000,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let mut shortcuts = BTreeMap::new();
        shortcuts.insert("qwenvl".into(), "Qwen/Qwen2.5-VL-7B-Instruct".into());
        shortcuts.insert("internvl".into(), "OpenGVLab/InternVL3-8B".into());
        Self { shortcuts }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dynamic_max_size: 10,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_tame_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "clip-vit-base-patch32".into(),
            cache_dir,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            endpoint: "http://localhost:8100".into(),
            labels: vec![
                "animal".into(),
                "person".into(),
                "household item".into(),
                "personal belonging".into(),
            ],
            text_threshold: 0.25,
            nms_iou: 0.5,
            redundancy_iou: 0.6,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            image_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

/// Returns `~/.tame/`, or `./.tame/` when no home directory is available.
pub fn default_tame_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tame")
}

/// Returns the default config file path: `~/.tame/config.toml`
pub fn default_config_path() -> PathBuf {
    default_tame_dir().join("config.toml")
}

impl TameConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            TameConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (TAME_MEMORY_ROOT, TAME_DATA_ROOT, TAME_MODEL,
    /// TAME_BASE_URL, TAME_API_KEY, TAME_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TAME_MEMORY_ROOT") {
            self.storage.memory_root = val;
        }
        if let Ok(val) = std::env::var("TAME_DATA_ROOT") {
            self.storage.data_root = val;
        }
        if let Ok(val) = std::env::var("TAME_MODEL") {
            self.model.model = val;
        }
        if let Ok(val) = std::env::var("TAME_BASE_URL") {
            self.model.base_url = val;
        }
        if let Ok(val) = std::env::var("TAME_API_KEY") {
            self.model.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("TAME_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        ensure!(
            r.image_weight.is_finite() && r.image_weight >= 0.0,
            "retrieval.image_weight must be a non-negative number"
        );
        ensure!(
            r.text_weight.is_finite() && r.text_weight >= 0.0,
            "retrieval.text_weight must be a non-negative number"
        );
        ensure!(
            self.memory.dynamic_max_size >= 1,
            "memory.dynamic_max_size must be at least 1"
        );
        for (name, iou) in [
            ("detection.nms_iou", self.detection.nms_iou),
            ("detection.redundancy_iou", self.detection.redundancy_iou),
        ] {
            ensure!(iou > 0.0 && iou <= 1.0, "{name} must be in (0, 1], got {iou}");
        }
        Ok(())
    }

    /// Full model id for the configured model shortcut.
    pub fn model_id(&self) -> String {
        resolve_model_id(&self.models.shortcuts, &self.model.model)
    }

    /// On-disk namespace for the configured model.
    pub fn model_short_name(&self) -> String {
        short_name(&self.models.shortcuts, &self.model_id())
    }

    /// `<memory_root>/<model short name>/`, with `~` expanded.
    pub fn resolved_memory_root(&self) -> PathBuf {
        expand_tilde(&self.storage.memory_root).join(self.model_short_name())
    }

    pub fn resolved_data_root(&self) -> PathBuf {
        expand_tilde(&self.storage.data_root)
    }

    pub fn resolved_results_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.results_dir)
    }
}

/// Convert a model shortcut into a full model id. Unknown arguments pass through unchanged.
pub fn resolve_model_id(shortcuts: &BTreeMap<String, String>, model_arg: &str) -> String {
    shortcuts
        .get(model_arg)
        .cloned()
        .unwrap_or_else(|| model_arg.to_string())
}

/// Short name for a model id: the shortcut that maps to it, otherwise the last path segment
/// lowercased with punctuation folded to `_`.
pub fn short_name(shortcuts: &BTreeMap<String, String>, model_id: &str) -> String {
    if let Some((short, _)) = shortcuts.iter().find(|(_, full)| full.as_str() == model_id) {
        return short.clone();
    }
    model_id
        .rsplit('/')
        .next()
        .unwrap_or(model_id)
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
