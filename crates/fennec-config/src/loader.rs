use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::FennecConfig;

/// Loads the Fennec configuration once at startup.
///
/// There is no hot reload: provider profiles, budgets, and scheduler triggers
/// are immutable for the process lifetime, so changing them requires a
/// restart.
pub struct ConfigLoader {
    config: FennecConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > FENNEC_CONFIG env > ~/.fennec/fennec.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("FENNEC_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fennec")
            .join("fennec.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> fennec_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<FennecConfig>(&raw).map_err(|e| {
                fennec_core::FennecError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            FennecConfig::default()
        };

        // Apply environment variable overrides
        let config = Self::apply_env_overrides(config);

        // Validate config — log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(fennec_core::FennecError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Get a snapshot of the loaded config.
    pub fn get(&self) -> FennecConfig {
        self.config.clone()
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (FENNEC_LOG_LEVEL, provider API keys).
    fn apply_env_overrides(mut config: FennecConfig) -> FennecConfig {
        if let Ok(v) = std::env::var("FENNEC_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("FENNEC_DAILY_TOKENS")
            && let Ok(tokens) = v.parse::<u64>()
        {
            config.budget.daily_tokens = tokens;
        }
        // API keys: env var fills in when the config file doesn't set the key.
        // Config file takes priority, env is the fallback.
        for provider in &mut config.providers {
            if provider.api_key.is_some() {
                continue;
            }
            let env_var = match provider.adapter {
                crate::schema::ProviderAdapterKind::Anthropic => "ANTHROPIC_API_KEY",
                crate::schema::ProviderAdapterKind::Gemini => "GEMINI_API_KEY",
                crate::schema::ProviderAdapterKind::OpenaiCompat => "XAI_API_KEY",
                _ => continue,
            };
            if let Ok(v) = std::env::var(env_var) {
                provider.api_key = Some(v);
            }
        }
        if let Some(ref mut embedding) = config.memory.embedding
            && embedding.api_key.is_none()
            && let Ok(v) = std::env::var("OPENAI_API_KEY")
        {
            embedding.api_key = Some(v);
        }
        config
    }
}
