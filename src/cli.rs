use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::UploadConfig;
use crate::utils::streaming_zip::CompressionMethod;

/// Command-line arguments for s3-archiver.
///
/// Upload tuning flags override the values loaded from the config file.
#[derive(Parser, Debug)]
#[clap(
    name = "s3-archiver",
    about = "Stream the objects under an S3 prefix into a ZIP archive uploaded back to S3",
    after_help = "Archives use the classic ZIP format: at most 65535 entries and 4 GiB in total."
)]
pub struct Args {
    /// Bucket holding the objects to archive
    #[clap(short, long)]
    pub source_bucket: Option<String>,

    /// Only archive keys starting with this prefix
    #[clap(short, long, default_value = "")]
    pub prefix: String,

    /// Bucket for the archive (default: the source bucket)
    #[clap(long)]
    pub dest_bucket: Option<String>,

    /// Key of the archive; $VAR and ${VAR} are expanded (default: archive-{timestamp}.zip)
    #[clap(short, long)]
    pub dest_key: Option<String>,

    /// AWS region
    #[clap(long)]
    pub region: Option<String>,

    /// AWS profile to use
    #[clap(long)]
    pub profile: Option<String>,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Maximum number of simultaneous part uploads
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// Part size in MiB (minimum 10)
    #[clap(long)]
    pub part_size_mb: Option<usize>,

    /// Attempts per part before the upload is aborted
    #[clap(long)]
    pub max_attempts: Option<u32>,

    /// Abort the upload if it takes longer than this many seconds
    #[clap(long)]
    pub timeout_secs: Option<u64>,

    /// Compression for archive entries
    #[clap(long, value_enum, default_value = "deflated")]
    pub compression: Compression,

    /// Do nothing when the prefix holds no objects
    #[clap(long)]
    pub skip_empty: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Deflated,
}

impl From<Compression> for CompressionMethod {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "s3-archiver.yaml")]
        path: PathBuf,
    },
}

impl Args {
    /// Apply command-line overrides on top of a loaded config
    pub fn apply_overrides(&self, config: &mut UploadConfig) {
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_uploads = concurrency;
        }
        if let Some(part_size_mb) = self.part_size_mb {
            config.part_size_mb = part_size_mb;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn test_help_states_archive_limits() {
        let help = Args::command().render_help().to_string();
        assert!(help.contains("65535 entries"));
        assert!(help.contains("4 GiB"));
    }

    #[test]
    fn test_basic_args_parsing() {
        let args = Args::parse_from(&[
            "s3-archiver",
            "--source-bucket", "logs",
            "--prefix", "app/2024/",
            "--dest-key", "archives/app-2024.zip",
            "--verbose",
        ]);

        assert_eq!(args.source_bucket, Some("logs".to_string()));
        assert_eq!(args.prefix, "app/2024/");
        assert_eq!(args.dest_key, Some("archives/app-2024.zip".to_string()));
        assert_eq!(args.dest_bucket, None);
        assert_eq!(args.compression, Compression::Deflated);
        assert!(args.verbose);
        assert!(!args.skip_empty);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_upload_overrides() {
        let args = Args::parse_from(&[
            "s3-archiver",
            "--source-bucket", "logs",
            "--concurrency", "8",
            "--part-size-mb", "64",
            "--max-attempts", "3",
            "--timeout-secs", "900",
            "--compression", "stored",
        ]);
        assert_eq!(args.compression, Compression::Stored);

        let mut config = UploadConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.max_concurrent_uploads, 8);
        assert_eq!(config.part_size_mb, 64);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.timeout_secs, Some(900));
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let args = Args::parse_from(&["s3-archiver", "--source-bucket", "logs"]);
        let mut config = UploadConfig {
            timeout_secs: Some(60),
            ..UploadConfig::default()
        };
        let before = config.clone();
        args.apply_overrides(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_init_config_subcommand() {
        let args = Args::parse_from(&["s3-archiver", "init-config"]);
        match args.command {
            Some(Commands::InitConfig { path }) => {
                assert_eq!(path, PathBuf::from("s3-archiver.yaml"));
            }
            _ => panic!("expected init-config"),
        }

        let args = Args::parse_from(&["s3-archiver", "init-config", "/tmp/custom.yaml"]);
        match args.command {
            Some(Commands::InitConfig { path }) => {
                assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
            }
            _ => panic!("expected init-config"),
        }
    }

    #[test]
    fn test_invalid_compression_is_rejected() {
        let result = Args::try_parse_from(&["s3-archiver", "--compression", "bzip2"]);
        assert!(result.is_err());
    }
}
