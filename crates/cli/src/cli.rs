//! Command-line arguments and how they override the loaded configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use streamloader_core::{Config, SourceKind};

#[derive(Parser)]
#[command(
    name = "streamloader",
    version,
    about = "Provision a delivery pipeline and bulk-load records into it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./streamloader.toml if present)
    #[arg(long, global = true, env = "STREAMLOADER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ensure the pipeline exists, wait for it, and send every line of a file
    Load(LoadArgs),
    /// Print the effective configuration after validation
    Check(PipelineArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Pipeline and client settings that may come from the command line.
#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// Delivery pipeline name
    #[arg(long)]
    pub pipeline: Option<String>,

    /// Sink bucket ARN
    #[arg(long)]
    pub bucket_arn: Option<String>,

    /// Name of the role the pipeline assumes
    #[arg(long)]
    pub role: Option<String>,

    /// Upstream stream ARN; makes the pipeline stream-fed
    #[arg(long)]
    pub stream_arn: Option<String>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Service endpoint override (e.g. a local emulator)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Records per batch submission (1-500)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Batch submissions allowed in flight at once
    #[arg(long)]
    pub max_in_flight: Option<usize>,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// File to load, one record per line
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit non-zero if any record could not be delivered
    #[arg(long)]
    pub strict: bool,

    /// Print metrics to stderr on exit
    #[arg(long)]
    pub metrics: bool,
}

impl PipelineArgs {
    /// Apply flags on top of the file and environment layers.
    pub fn apply(&self, config: &mut Config) {
        if let Some(name) = &self.pipeline {
            config.pipeline.name = name.clone();
        }
        if let Some(bucket_arn) = &self.bucket_arn {
            config.pipeline.bucket_arn = bucket_arn.clone();
        }
        if let Some(role) = &self.role {
            config.pipeline.role_name = role.clone();
        }
        if let Some(stream_arn) = &self.stream_arn {
            config.pipeline.source = SourceKind::StreamFed;
            config.pipeline.stream_arn = Some(stream_arn.clone());
        }
        if let Some(region) = &self.region {
            config.aws.region = region.clone();
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            config.aws.endpoint_url = Some(endpoint_url.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.dispatch.batch_size = batch_size;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.dispatch.max_in_flight_batches = max_in_flight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_load() {
        let cli = Cli::try_parse_from([
            "streamloader",
            "load",
            "--input",
            "data.csv",
            "--pipeline",
            "events",
            "--bucket-arn",
            "arn:aws:s3:::raw-data",
            "--role",
            "events_role",
            "--batch-size",
            "50",
            "--strict",
        ])
        .unwrap();

        let Commands::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.input, PathBuf::from("data.csv"));
        assert_eq!(args.pipeline.pipeline.as_deref(), Some("events"));
        assert_eq!(args.pipeline.batch_size, Some(50));
        assert!(args.strict);
        assert!(!args.json);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_load_requires_input() {
        assert!(Cli::try_parse_from(["streamloader", "load", "--pipeline", "events"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.pipeline.name = "from-file".to_string();
        config.dispatch.batch_size = 200;

        let args = PipelineArgs {
            pipeline: Some("events".to_string()),
            stream_arn: Some("arn:aws:kinesis:us-east-2:1:stream/in".to_string()),
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.pipeline.name, "events");
        assert_eq!(config.pipeline.source, SourceKind::StreamFed);
        assert_eq!(config.aws.region, "eu-west-1");
        assert_eq!(config.dispatch.batch_size, 200);
    }
}
