use crate::*;
use std::path::PathBuf;

/// Where hand cardinalities come from. Exactly one source per run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSource {
    /// One byte per hand, values `0..=6`.
    Sizes(PathBuf),
    /// One little-endian u32 card mask per hand.
    Masks(PathBuf),
}

/// How the no-bet action is identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoBet {
    Index(usize),
    Detect,
}

/// Cluster count per hand-size group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clusters {
    /// K for sizes 1 through 6.
    Explicit([usize; HAND_MAX]),
    /// One bucket per hand up to size 3, a fixed count above.
    Auto,
}

impl Default for Clusters {
    fn default() -> Self {
        Self::Explicit([24, 276, 2024, 4000, 4000, 4000])
    }
}

impl Clusters {
    /// K for `group` given how many hands it holds.
    pub fn k(&self, group: usize, population: usize) -> usize {
        match self {
            Self::Explicit(ks) => ks[group - 1],
            Self::Auto if group <= KMEANS_AUTO_IDENTITY => population,
            Self::Auto => KMEANS_AUTO_CLUSTERS,
        }
    }

    /// K for every group, indexed by `group - 1`.
    pub fn resolve(&self, histogram: &[usize; HAND_MAX + 1]) -> [usize; HAND_MAX] {
        std::array::from_fn(|i| self.k(i + 1, histogram[i + 1]))
    }
}

impl std::str::FromStr for Clusters {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let ks = s
            .split(',')
            .map(|k| k.trim().parse::<usize>())
            .collect::<std::result::Result<Vec<usize>, _>>()
            .map_err(|e| Error::Config(format!("cluster counts {:?}: {}", s, e)))?;
        ks.try_into()
            .map(Self::Explicit)
            .map_err(|ks: Vec<usize>| {
                Error::Config(format!(
                    "expected {} cluster counts or 'auto', got {}",
                    HAND_MAX,
                    ks.len()
                ))
            })
    }
}

impl std::fmt::Display for Clusters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Explicit(ks) => write!(
                f,
                "{}",
                ks.iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

/// Everything one run needs, passed explicitly to every stage.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub table: PathBuf,
    pub hands: HandSource,
    pub out: PathBuf,
    pub device: Device,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub clusters: Clusters,
    pub no_bet: NoBet,
}

impl Config {
    /// Defaults for everything but the inputs and output directory.
    pub fn new(table: PathBuf, hands: HandSource, out: PathBuf) -> Self {
        Self {
            table,
            hands,
            out,
            device: Device::default(),
            schedule: Schedule::default(),
            clusters: Clusters::default(),
            no_bet: NoBet::Detect,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ref s = self.schedule;
        if s.iterations == 0 || s.batch == 0 || s.chunk == 0 {
            return Err(Error::Config(format!(
                "iterations ({}), batch ({}) and chunk ({}) must be positive",
                s.iterations, s.batch, s.chunk
            )));
        }
        if let Clusters::Explicit(ks) = self.clusters {
            if let Some(group) = ks.iter().position(|k| *k == 0) {
                return Err(Error::Config(format!("zero clusters for group {}", group + 1)));
            }
        }
        Ok(())
    }
}
