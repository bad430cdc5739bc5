//! CLI command implementations.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::ValueEnum;
use mu_config::{Pipeline, PipelineError, ResolverConfig, SchemaSource, Source};
use mu_core::{Context, StructuredValue, flatten};
use tokio::io::AsyncReadExt;
use tracing::info;

/// Settings shared by every command.
pub struct Options {
    pub vars: Vec<String>,
    pub schema: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl Options {
    fn pipeline(&self) -> Result<Pipeline> {
        let schema = match &self.schema {
            Some(path) => SchemaSource::File(path.clone()),
            None => SchemaSource::Bundled,
        };
        let config = ResolverConfig::new()
            .with_command_timeout(self.timeout)
            .with_schema(schema);
        Pipeline::new(config).context("cannot load configuration schema")
    }

    fn context(&self) -> Result<Context> {
        let ctx = Context::from_entries(&self.vars)?;
        Ok(ctx.with_build_defaults())
    }
}

/// Map a path argument to a source; `-` reads standard input.
async fn source(path: &str) -> Result<Source> {
    if path == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("cannot read configuration from stdin")?;
        Ok(Source::Text(text))
    } else {
        Ok(Source::file(path))
    }
}

fn stage_error(path: &str, err: PipelineError) -> anyhow::Error {
    anyhow!("{} stage failed for {}: {}", err.stage(), path, err)
}

async fn resolve_value(options: &Options, path: &str) -> Result<StructuredValue> {
    let pipeline = options.pipeline()?;
    let context = options.context()?;
    let source = source(path).await?;
    pipeline
        .resolve(&source, &context)
        .await
        .map_err(|e| stage_error(path, e))
}

fn format_value(value: &StructuredValue, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

fn format_env(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

pub async fn resolve(options: &Options, path: &str, format: OutputFormat) -> Result<()> {
    let value = resolve_value(options, path).await?;
    let output = format_value(&value, format)?;
    println!("{}", output.trim_end());
    Ok(())
}

/// Returns whether the configuration is valid.
pub async fn validate(options: &Options, path: &str) -> Result<bool> {
    let pipeline = options.pipeline()?;
    let context = options.context()?;
    let source = source(path).await?;

    match pipeline.resolve(&source, &context).await {
        Ok(_) => {
            println!("Configuration is valid");
            Ok(true)
        }
        Err(e) => {
            println!("Configuration error ({} stage): {}", e.stage(), e);
            Ok(false)
        }
    }
}

pub async fn render(options: &Options, path: &str) -> Result<()> {
    let pipeline = options.pipeline()?;
    let context = options.context()?;
    let source = source(path).await?;
    let text = pipeline
        .render_source(&source, &context)
        .await
        .map_err(|e| stage_error(path, e))?;
    print!("{text}");
    Ok(())
}

pub async fn env(options: &Options, path: &str, prefix: &str) -> Result<()> {
    let value = resolve_value(options, path).await?;
    let vars = flatten(&value, prefix);
    info!(count = vars.len(), "Flattened configuration");
    print!("{}", format_env(&vars));
    Ok(())
}
