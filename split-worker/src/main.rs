use anyhow::{Context, Error};
use common_ldif::Dn;
use envconfig::Envconfig;
use split_worker::{
    config::{OutsideMode, SourceSpec, SplitConfig, TargetSpec},
    pipeline::run_split,
    strategy::StrategyConfig,
    summary::ResultCode,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

/// Environment-driven configuration. The richer CLI front end parses arguments
/// into the same `SplitConfig`; this binary keeps the engine runnable on its
/// own.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "SPLIT_BASE_DN")]
    pub split_base_dn: String,

    // Comma separated, read in order.
    #[envconfig(from = "SOURCE_PATHS")]
    pub source_paths: String,

    // Empty means "derive from the single source path".
    #[envconfig(from = "TARGET_BASE_PATH", default = "")]
    pub target_base_path: String,

    #[envconfig(from = "SET_COUNT", default = "2")]
    pub set_count: usize,

    // Strategy selection as JSON, e.g. {"type":"attribute_hash","attribute":"st"}
    #[envconfig(from = "STRATEGY", default = "{\"type\":\"rdn_hash\"}")]
    pub strategy: String,

    #[envconfig(from = "OUTSIDE_TO_DEDICATED_SET", default = "false")]
    pub outside_to_dedicated_set: bool,

    #[envconfig(from = "OUTSIDE_TO_ALL_SETS", default = "false")]
    pub outside_to_all_sets: bool,

    #[envconfig(from = "ASSUME_FLAT_DIT", default = "false")]
    pub assume_flat_dit: bool,

    #[envconfig(from = "NUM_THREADS", default = "1")]
    pub num_threads: usize,

    #[envconfig(from = "SOURCES_GZIPPED", default = "false")]
    pub sources_gzipped: bool,

    #[envconfig(from = "TARGET_GZIP", default = "false")]
    pub target_gzip: bool,
}

impl Config {
    fn split_config(&self) -> Result<SplitConfig, Error> {
        let split_base =
            Dn::parse(&self.split_base_dn).context("SPLIT_BASE_DN is not a valid DN")?;
        let strategy: StrategyConfig =
            serde_json::from_str(&self.strategy).context("STRATEGY is not a valid strategy")?;

        let sources: Vec<SourceSpec> = self
            .source_paths
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| SourceSpec {
                path: p.into(),
                gzipped: self.sources_gzipped,
                transform: None,
            })
            .collect();

        let base_path = if self.target_base_path.is_empty() {
            None
        } else {
            Some(self.target_base_path.clone().into())
        };

        Ok(SplitConfig {
            split_base,
            set_count: self.set_count,
            strategy,
            outside: OutsideMode::from_flags(
                self.outside_to_dedicated_set,
                self.outside_to_all_sets,
            ),
            assume_flat_dit: self.assume_flat_dit,
            num_threads: self.num_threads,
            sources,
            target: TargetSpec {
                base_path,
                gzip: self.target_gzip,
                transform: None,
            },
        })
    }
}

fn main() {
    setup_tracing();

    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(ResultCode::ParamError.value());
        }
    };
    let split_config = match config.split_config() {
        Ok(split_config) => split_config,
        Err(e) => {
            error!("configuration error: {e:#}");
            std::process::exit(ResultCode::ParamError.value());
        }
    };

    info!("Starting split run");
    match run_split(&split_config) {
        Ok(summary) => {
            println!("{}", summary.report());
            std::process::exit(summary.result_code().value());
        }
        Err(e) => {
            error!("split aborted: {e}");
            std::process::exit(e.result_code().value());
        }
    }
}
