//! Bucketing Binary
//!
//! Reads the probability table and hand sizes, clusters every hand-size
//! group, and writes labels, centers, normalization stats, the global
//! bucket mapping, and a run manifest to the output directory.

use anyhow::Context;
use clap::Parser;
use handbuckets::*;

fn main() -> anyhow::Result<()> {
    log().context("initializing logger")?;
    let config = Config::try_from(cli::Cli::parse()).context("reading arguments")?;
    let mut sink = Artifacts::create(&config.out).context("creating output directory")?;
    let buckets = Pipeline::run(&config, &mut sink)
        .with_context(|| format!("bucketing {}", config.table.display()))?;
    log::info!(
        "{:<32}{:<32}",
        "buckets written",
        format!("{} hands to {}", buckets.len(), sink.dir().display())
    );
    Ok(())
}
