//! Strategic bucketing of Thai Poker hands.
//!
//! The full space of hands (every subset of at most six cards from a 24-card
//! deck) is compressed into a bounded number of buckets per hand size. Hands
//! land in the same bucket when their conditional bid-probability profiles,
//! measured against opponents of every size, look alike.
//!
//! ## Pipeline
//!
//! 1. [`ProbabilityTable`]: parse the upstream `TTP0` count table
//! 2. [`HandSizes`]: cardinality of every hand index
//! 3. [`Features`]: empirical probabilities `count / C(24 - n_me, n_opp)`
//! 4. [`Normalization`]: square root then per-column z-score
//! 5. [`MiniBatch`]: streaming k-means over the normalized rows
//! 6. [`Buckets`]: merge per-group labels into the global mapping
//!
//! [`Pipeline`] drives the six hand-size groups in order and hands each
//! group's artifacts to a [`Sink`] as soon as they exist.
mod artifacts;
mod backend;
mod buckets;
mod combinatorics;
mod config;
mod error;
mod features;
mod kmeans;
mod matrix;
mod normalize;
mod pipeline;
mod sizes;
mod table;

#[cfg(feature = "cli")]
pub mod cli;


pub use artifacts::*;
pub use backend::*;
pub use buckets::*;
pub use combinatorics::*;
pub use config::*;
pub use error::*;
pub use features::*;
pub use kmeans::*;
pub use matrix::*;
pub use normalize::*;
pub use pipeline::*;
pub use sizes::*;
pub use table::*;

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Empirical conditional probabilities and their normalized images.
pub type Probability = f32;
/// Squared distances and accumulated clustering loss.
pub type Energy = f32;

// ============================================================================
// DECK GEOMETRY
// ============================================================================
/// Cards in the deck (six ranks by four suits).
pub const DECK_SIZE: usize = 24;
/// Largest hand a player can hold.
pub const HAND_MAX: usize = 6;
/// Hand-size groups processed by the pipeline, `1..=HAND_MAX`.
pub const GROUPS: std::ops::RangeInclusive<usize> = 1..=HAND_MAX;
/// Opponent hand sizes each feature row is conditioned on.
pub const OPPONENTS: std::ops::RangeInclusive<usize> = 1..=HAND_MAX;
/// Only the low 24 bits of a hand mask name cards.
pub const MASK_BITS: u32 = (1 << DECK_SIZE) - 1;

// ============================================================================
// PROBABILITY TABLE FORMAT
// ============================================================================
/// Leading tag of a probability table file.
pub const TABLE_MAGIC: &[u8; 4] = b"TTP0";
/// Tag plus four u32 header fields.
pub const TABLE_HEADER_BYTES: usize = 20;
/// Card dimension of the production table (card counts 0..=24).
pub const TABLE_CARDS: u32 = DECK_SIZE as u32 + 1;

// ============================================================================
// K-MEANS DEFAULTS
// ============================================================================
/// Full passes over a group before the final assignment.
pub const KMEANS_ITERATIONS: usize = 100;
/// Points per streamed minibatch.
pub const KMEANS_BATCH_SIZE: usize = 8192;
/// Centers per distance block during assignment.
pub const KMEANS_CENTER_CHUNK: usize = 1024;
/// Default seed for every random stream of a run.
pub const KMEANS_SEED: u64 = 42;
/// Cluster count the auto policy gives groups larger than three cards.
pub const KMEANS_AUTO_CLUSTERS: usize = 4000;
/// Largest hand size the auto policy leaves uncompressed.
pub const KMEANS_AUTO_IDENTITY: usize = 3;
/// Columns with a smaller population std are centered but not scaled.
pub const STD_FLOOR: f64 = 1e-12;

// ============================================================================
// RUNTIME UTILITIES
// ============================================================================
/// Initialize dual logging (terminal + file) with timestamped log files.
/// Creates `logs/` directory and writes DEBUG level to file, INFO to terminal.
#[cfg(feature = "cli")]
pub fn log() -> std::io::Result<()> {
    std::fs::create_dir_all("logs")?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time))?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).map_err(std::io::Error::other)
}
