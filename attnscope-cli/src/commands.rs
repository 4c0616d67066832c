//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::Context;
use attnscope_core::attention::tensor::NestedAttention;
use attnscope_core::attention::{flow_with, AttentionTensor};
use attnscope_core::config::{load_config, AttnConfig};
use attnscope_core::gateway::run_gateway;
use attnscope_core::pipeline::{aligned_tokens, analyze};
use attnscope_core::text::resolve;
use attnscope_core::{AttentionPipeline, HttpModelService, Token, TokenizerConvention};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Tokenizer output (and optionally attention) captured from a model run.
#[derive(Debug, Deserialize)]
pub struct CapturedInput {
    pub text: String,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub attentions: Option<NestedAttention>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub convention: Option<TokenizerConvention>,
}

impl CapturedInput {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid input file {}", path.display()))
    }

    /// Explicit convention, else the one the model name implies.
    pub fn convention(&self) -> TokenizerConvention {
        self.convention
            .or_else(|| self.model.as_deref().map(TokenizerConvention::for_model))
            .unwrap_or_default()
    }

    pub fn tensor(&self) -> anyhow::Result<AttentionTensor> {
        let nested = self
            .attentions
            .clone()
            .context("Input file has no \"attentions\" field")?;
        Ok(AttentionTensor::from_nested(nested)?)
    }

    pub fn tokens(&self) -> Vec<Token> {
        aligned_tokens(self.tokens.clone(), &self.text, self.convention())
    }
}

fn load(workspace: &Path) -> anyhow::Result<AttnConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            service_url,
        } => {
            let mut config = load(workspace)?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(url) = service_url {
                config.service.base_url = url;
            }
            let service = HttpModelService::new(&config.service)?;
            info!(service = %service.base_url(), "using model service");
            let pipeline = Arc::new(AttentionPipeline::new(Arc::new(service), config));
            run_gateway(pipeline).await?;
            Ok(())
        }
        Commands::Analyze {
            input,
            method,
            no_identity,
            pretty,
        } => {
            let mut config = load(workspace)?;
            if no_identity {
                config.analysis.add_identity = false;
            }
            let input = CapturedInput::read(&input)?;
            let tensor = input.tensor()?;
            let method = method.unwrap_or(config.analysis.method);
            let convention = input.convention();
            let response = analyze(
                input.tokens,
                &input.text,
                &tensor,
                method,
                &config.analysis,
                convention,
            )?;
            print_json(&response, pretty)
        }
        Commands::Flow {
            input,
            source,
            remove_diagonal,
        } => {
            let config = load(workspace)?;
            let input = CapturedInput::read(&input)?;
            let tensor = input.tensor()?;
            let mut options = config.analysis.attribution_options().flow;
            options.remove_diagonal = remove_diagonal;
            let row = flow_with(&tensor, Some(source), &options)?;
            for (token, value) in input.tokens.iter().zip(row.row(0)) {
                println!("{:>16}  {:.6}", token, value);
            }
            Ok(())
        }
        Commands::Align { input } => {
            let input = CapturedInput::read(&input)?;
            for token in input.tokens() {
                let word = token
                    .word_index
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>4}  {:<16} {}", token.index, token.text, word);
            }
            Ok(())
        }
        Commands::Mask {
            input,
            index,
            replacement,
        } => {
            let input = CapturedInput::read(&input)?;
            let tokens = Token::sequence(input.tokens.iter().cloned());
            let target = resolve(&tokens, &input.text, index, &replacement, input.convention())?;
            print_json(&target, true)
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".attnscope");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&AttnConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
