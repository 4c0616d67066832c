//! Configuration system for attnscope.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/attnscope/config.toml` and/or
//! `.attnscope/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::attention::flow::DEFAULT_CAPACITY_THRESHOLD;
use crate::attention::{AttributionOptions, FlowOptions, RolloutOptions, VisualizationMethod};
use crate::gateway::GatewayConfig;
use crate::text::TokenizerConvention;
use crate::types::ModelInfo;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttnConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default = "default_models")]
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub predictions: PredictionConfig,
}

impl Default for AttnConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            service: ServiceConfig::default(),
            models: default_models(),
            gateway: GatewayConfig::default(),
            predictions: PredictionConfig::default(),
        }
    }
}

impl AttnConfig {
    /// Look up a registered model by id.
    pub fn model(&self, id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }
}

/// Attention post-processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Method used when a request does not choose one.
    pub method: VisualizationMethod,
    /// Add the identity (residual connection) before normalizing each layer.
    pub add_identity: bool,
    /// Flow edges below this capacity are left out of the graph.
    pub flow_threshold: f64,
    pub flow_parallel: bool,
    /// Inputs with more tokens than this are rejected.
    pub max_sequence_len: usize,
    /// Lower limit for flow, which runs one max-flow query per token pair.
    pub flow_max_sequence_len: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            method: VisualizationMethod::Raw,
            add_identity: true,
            flow_threshold: DEFAULT_CAPACITY_THRESHOLD,
            flow_parallel: true,
            max_sequence_len: 512,
            flow_max_sequence_len: 64,
        }
    }
}

impl AnalysisConfig {
    pub fn attribution_options(&self) -> AttributionOptions {
        AttributionOptions {
            rollout: RolloutOptions {
                add_identity: self.add_identity,
            },
            flow: FlowOptions {
                add_identity: self.add_identity,
                threshold: self.flow_threshold,
                parallel: self.flow_parallel,
                ..FlowOptions::default()
            },
        }
    }
}

/// Where the model service lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            timeout_secs: 60,
        }
    }
}

/// A model the gateway is allowed to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    /// Sub-word marker convention of the model's tokenizer.
    #[serde(default)]
    pub convention: TokenizerConvention,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let convention = TokenizerConvention::for_model(&id);
        Self {
            id,
            name: name.into(),
            convention,
        }
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("bert-base-uncased", "BERT Base Uncased"),
        ModelSpec::new("roberta-base", "RoBERTa Base"),
    ]
}

/// Masked-word prediction limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Hard cap on returned predictions, whatever `top_k` asks for.
    pub max_predictions: usize,
    pub default_top_k: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_predictions: 10,
            default_top_k: 10,
        }
    }
}

/// Load configuration with layered merging.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `ATTNSCOPE_`)
/// 3. Workspace-local config (`.attnscope/config.toml`)
/// 4. User config (`~/.config/attnscope/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AttnConfig>,
) -> Result<AttnConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AttnConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "attnscope", "attnscope") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".attnscope").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // ATTNSCOPE_ANALYSIS__METHOD, ATTNSCOPE_GATEWAY__PORT, ...
    figment = figment.merge(Env::prefixed("ATTNSCOPE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
