//! Command-line interface and settings resolution
//!
//! Each setting resolves in priority order: CLI flag, environment variable
//! (via clap `env`), TOML config, compiled default.

use crate::context::Tools;
use crate::error::Result;
use crate::strategy::FusionStrategy;
use clap::Parser;
use mafl_common::config::{CompiledDefaults, TomlConfig};
use mafl_common::{Error, SimilarityMetric};
use std::path::{Path, PathBuf};

/// Command-line arguments for mafl-vote
#[derive(Parser, Debug, Clone)]
#[command(name = "mafl-vote")]
#[command(about = "Resample template labels into target space and fuse them by voting")]
#[command(version)]
pub struct Args {
    /// Do majority voting over every template
    #[arg(long)]
    pub majvote: bool,

    /// Do XCORR voting with the top N templates
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub xcorr: Option<u32>,

    /// Do NMI voting with the top N templates
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub nmi: Option<u32>,

    /// Number of commands to run in parallel
    #[arg(long, value_name = "N", env = "MAFL_PROCESSES", value_parser = clap::value_parser!(u32).range(1..))]
    pub processes: Option<u32>,

    /// Folder containing atlases/, templates/ and subjects/
    #[arg(long, env = "MAFL_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Output folder (score files, registrations, fusion results)
    #[arg(long, env = "MAFL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Registrations from template library to subjects [default: <output-dir>/registrations]
    #[arg(long, env = "MAFL_REGISTRATIONS_DIR")]
    pub registrations_dir: Option<PathBuf>,

    /// Parent directory for temporary workspaces [default: /dev/shm]
    #[arg(long, env = "MAFL_TEMP_ROOT")]
    pub temp_root: Option<PathBuf>,

    /// Template label archive or directory [default: <output-dir>/labels.tar.gz]
    #[arg(long, env = "MAFL_TEMPLATE_LABELS")]
    pub template_labels: Option<PathBuf>,

    /// Plan and log commands without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Invert the transformations during resampling from the template library
    #[arg(long)]
    pub invert: bool,

    /// Stop after the first target that fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Write a JSON run summary to this path
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Config file [default: $MAFL_CONFIG, then ~/.config/mafl/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, env = "MAFL_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Restrict processing to these target stems
    #[arg(value_name = "TARGET_STEM")]
    pub targets: Vec<String>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub strategies: Vec<FusionStrategy>,
    pub targets: Vec<String>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub registrations_dir: PathBuf,
    pub fusion_dir: PathBuf,
    pub temp_root: PathBuf,
    pub template_labels: PathBuf,
    pub concurrency: usize,
    pub image_extension: String,
    pub tools: Tools,
    pub invert: bool,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub summary: Option<PathBuf>,
    pub log_level: String,
}

impl Args {
    /// Enabled strategies in fixed order: majvote, xcorr, nmi
    pub fn strategies(&self) -> Vec<FusionStrategy> {
        let mut strategies = Vec::new();
        if self.majvote {
            strategies.push(FusionStrategy::Majority);
        }
        if let Some(n) = self.xcorr {
            strategies.push(FusionStrategy::TopN {
                metric: SimilarityMetric::Xcorr,
                n: n as usize,
            });
        }
        if let Some(n) = self.nmi {
            strategies.push(FusionStrategy::TopN {
                metric: SimilarityMetric::Nmi,
                n: n as usize,
            });
        }
        strategies
    }

    /// Merge with the TOML config and compiled defaults
    pub fn resolve(self, toml: &TomlConfig, defaults: &CompiledDefaults) -> Result<Settings> {
        let strategies = self.strategies();
        if strategies.is_empty() {
            return Err(Error::Config(
                "No fusion strategy selected (use --majvote, --xcorr N or --nmi N)".to_string(),
            )
            .into());
        }

        let concurrency = match self.processes {
            Some(n) => n as usize,
            None => toml.concurrency.unwrap_or(defaults.concurrency),
        };
        if concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()).into());
        }

        let input_dir = pick(self.input_dir, &toml.input_dir, &defaults.input_dir);
        let output_dir = absolute(&pick(self.output_dir, &toml.output_dir, &defaults.output_dir))?;
        let registrations_dir = self
            .registrations_dir
            .or_else(|| toml.registrations_dir.clone())
            .unwrap_or_else(|| output_dir.join("registrations"));
        let template_labels = self
            .template_labels
            .or_else(|| toml.template_labels.clone())
            .unwrap_or_else(|| output_dir.join("labels.tar.gz"));
        let temp_root = pick(self.temp_root, &toml.temp_root, &defaults.temp_root);

        let tools = Tools {
            resample: toml
                .tools
                .resample
                .clone()
                .unwrap_or_else(|| defaults.resample_tool.clone()),
            vote: toml
                .tools
                .vote
                .clone()
                .unwrap_or_else(|| defaults.vote_tool.clone()),
            extract: toml
                .tools
                .extract
                .clone()
                .unwrap_or_else(|| defaults.extract_tool.clone()),
        };

        let log_level = self
            .log_level
            .or_else(|| toml.logging.level.clone())
            .unwrap_or_else(|| defaults.log_level.clone());

        Ok(Settings {
            strategies,
            targets: self.targets,
            input_dir,
            fusion_dir: output_dir.join("fusion"),
            output_dir,
            registrations_dir,
            temp_root,
            template_labels,
            concurrency,
            image_extension: toml
                .image_extension
                .clone()
                .unwrap_or_else(|| defaults.image_extension.clone()),
            tools,
            invert: self.invert,
            dry_run: self.dry_run,
            fail_fast: self.fail_fast,
            summary: self.summary,
            log_level,
        })
    }
}

fn pick(cli: Option<PathBuf>, toml: &Option<PathBuf>, default: &Path) -> PathBuf {
    cli.or_else(|| toml.clone())
        .unwrap_or_else(|| default.to_path_buf())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoteError;
    use serial_test::serial;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mafl-vote").chain(args.iter().copied())).unwrap()
    }

    fn defaults() -> CompiledDefaults {
        CompiledDefaults {
            temp_root: PathBuf::from("/tmp"),
            ..CompiledDefaults::for_current_platform()
        }
    }

    #[test]
    fn test_strategy_flags() {
        let args = parse(&["--majvote", "--xcorr", "5", "--nmi", "3"]);

        assert_eq!(
            args.strategies(),
            vec![
                FusionStrategy::Majority,
                FusionStrategy::TopN {
                    metric: SimilarityMetric::Xcorr,
                    n: 5
                },
                FusionStrategy::TopN {
                    metric: SimilarityMetric::Nmi,
                    n: 3
                },
            ]
        );
    }

    #[test]
    fn test_top_n_zero_rejected() {
        let result = Args::try_parse_from(["mafl-vote", "--xcorr", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_targets_and_dry_run() {
        let args = parse(&["--majvote", "-n", "S01", "S02"]);
        assert!(args.dry_run);
        assert_eq!(args.targets, vec!["S01", "S02"]);
    }

    #[test]
    #[serial]
    fn test_no_strategy_is_config_error() {
        let args = parse(&["S01"]);
        let result = args.resolve(&TomlConfig::default(), &defaults());

        assert!(matches!(
            result,
            Err(VoteError::Common(Error::Config(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        std::env::remove_var("MAFL_PROCESSES");
        std::env::remove_var("MAFL_OUTPUT_DIR");
        std::env::remove_var("MAFL_REGISTRATIONS_DIR");
        std::env::remove_var("MAFL_TEMPLATE_LABELS");

        let settings = parse(&["--majvote", "--output-dir", "/data/out"])
            .resolve(&TomlConfig::default(), &defaults())
            .unwrap();

        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.fusion_dir, PathBuf::from("/data/out/fusion"));
        assert_eq!(
            settings.registrations_dir,
            PathBuf::from("/data/out/registrations")
        );
        assert_eq!(
            settings.template_labels,
            PathBuf::from("/data/out/labels.tar.gz")
        );
        assert_eq!(settings.tools, Tools::default());
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    #[serial]
    fn test_cli_overrides_toml() {
        std::env::remove_var("MAFL_PROCESSES");
        std::env::remove_var("MAFL_OUTPUT_DIR");

        let toml = TomlConfig::parse(
            r#"
            output_dir = "/toml/out"
            concurrency = 2
            [tools]
            vote = "fuse_labels"
            "#,
        )
        .unwrap();

        let settings = parse(&["--majvote", "--processes", "12"])
            .resolve(&toml, &defaults())
            .unwrap();

        assert_eq!(settings.concurrency, 12);
        assert_eq!(settings.output_dir, PathBuf::from("/toml/out"));
        assert_eq!(settings.tools.vote, "fuse_labels");
        assert_eq!(settings.tools.resample, "mincresample");
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        std::env::set_var("MAFL_PROCESSES", "5");
        let toml = TomlConfig {
            concurrency: Some(2),
            ..Default::default()
        };

        let settings = parse(&["--majvote"]).resolve(&toml, &defaults());
        std::env::remove_var("MAFL_PROCESSES");

        assert_eq!(settings.unwrap().concurrency, 5);
    }

    #[test]
    #[serial]
    fn test_toml_zero_concurrency_rejected() {
        std::env::remove_var("MAFL_PROCESSES");
        let toml = TomlConfig {
            concurrency: Some(0),
            ..Default::default()
        };

        assert!(parse(&["--majvote"]).resolve(&toml, &defaults()).is_err());
    }
}
