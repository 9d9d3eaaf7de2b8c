use crate::*;
use clap::ArgGroup;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cluster hands into strategic buckets", long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["sizes", "masks"])))]
#[command(group(ArgGroup::new("nobet").required(true).args(["no_bet", "detect_no_bet"])))]
pub struct Cli {
    /// Probability table (TTP0)
    #[arg(long)]
    pub table: PathBuf,
    /// One byte per hand holding its size
    #[arg(long)]
    pub sizes: Option<PathBuf>,
    /// One little-endian u32 card mask per hand
    #[arg(long)]
    pub masks: Option<PathBuf>,
    /// Output directory
    #[arg(long, default_value = "buckets")]
    pub out: PathBuf,
    /// auto, vectorized or accelerated
    #[arg(long, default_value_t = Device::Auto)]
    pub device: Device,
    #[arg(long, default_value_t = KMEANS_ITERATIONS)]
    pub iterations: usize,
    #[arg(long, default_value_t = KMEANS_BATCH_SIZE)]
    pub batch: usize,
    #[arg(long, default_value_t = KMEANS_CENTER_CHUNK)]
    pub chunk: usize,
    #[arg(long, default_value_t = KMEANS_SEED)]
    pub seed: u64,
    /// Six comma-separated counts for sizes 1..=6, or "auto"
    #[arg(long, default_value_t = Clusters::default())]
    pub clusters: Clusters,
    /// Index of the no-bet action
    #[arg(long)]
    pub no_bet: Option<usize>,
    /// Detect the no-bet action as the all-zero one
    #[arg(long)]
    pub detect_no_bet: bool,
    /// Leave empty clusters where they are instead of reseeding them
    #[arg(long)]
    pub keep_empty: bool,
}

impl TryFrom<Cli> for Config {
    type Error = Error;
    fn try_from(cli: Cli) -> Result<Self> {
        let hands = match (cli.sizes, cli.masks) {
            (Some(path), None) => HandSource::Sizes(path),
            (None, Some(path)) => HandSource::Masks(path),
            _ => return Err(Error::Config("exactly one of --sizes or --masks".into())),
        };
        let no_bet = match (cli.no_bet, cli.detect_no_bet) {
            (Some(action), false) => NoBet::Index(action),
            (None, true) => NoBet::Detect,
            _ => {
                return Err(Error::Config(
                    "exactly one of --no-bet or --detect-no-bet".into(),
                ));
            }
        };
        let config = Config {
            table: cli.table,
            hands,
            out: cli.out,
            device: cli.device,
            schedule: Schedule {
                iterations: cli.iterations,
                batch: cli.batch,
                chunk: cli.chunk,
                seed: cli.seed,
                reinit: !cli.keep_empty,
            },
            clusters: cli.clusters,
            no_bet,
        };
        config.validate()?;
        Ok(config)
    }
}
