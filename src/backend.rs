//! Nearest-center assignment backends.
//!
//! Both backends evaluate the same squared-distance expansion
//!
//! ```text
//! d²(x, c) = ‖x‖² + ‖c‖² − 2 x·c
//! ```
//!
//! over blocks of at most `chunk` centers, floor it at zero, and keep the
//! first minimum. They differ only in how points are scheduled.
use crate::*;
use rayon::prelude::*;

/// Index of the nearest center and the squared distance to it.
pub type Neighbor = (usize, Energy);

/// Points handed to one accelerated worker at a time.
const ACCELERATED_ROWS: usize = 64;

/// Centers of one pass, with their squared norms precomputed.
pub struct Centers<'a> {
    matrix: &'a Matrix,
    norms: Vec<f32>,
    chunk: usize,
}

impl<'a> Centers<'a> {
    pub fn new(matrix: &'a Matrix, chunk: usize) -> Self {
        Self {
            matrix,
            norms: matrix.norms(),
            chunk: chunk.max(1),
        }
    }

    pub fn k(&self) -> usize {
        self.matrix.rows()
    }

    pub fn dims(&self) -> usize {
        self.matrix.cols()
    }

    /// Center index ranges of at most `chunk` centers each.
    fn blocks(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        (0..self.k())
            .step_by(self.chunk)
            .map(|start| start..(start + self.chunk).min(self.k()))
    }

    /// Fold one block of centers into the running best of each point.
    fn block(&self, points: &[f32], block: std::ops::Range<usize>, best: &mut [Neighbor]) {
        let dims = self.dims();
        points
            .chunks_exact(dims)
            .zip(best.iter_mut())
            .for_each(|(x, best)| {
                let xn = dot(x, x);
                for j in block.clone() {
                    let c = self.matrix.row(j);
                    let d2 = (xn + self.norms[j] - 2. * dot(x, c)).max(0.);
                    if d2 < best.1 {
                        *best = (j, d2);
                    }
                }
            });
    }
}

/// A way of running batched nearest-center assignment.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Nearest center of every row of `batch`, a row-major `rows × dims` slice.
    fn assign(&self, batch: &[f32], centers: &Centers) -> Vec<Neighbor>;
}

/// Single-threaded blockwise evaluation: each block of centers is swept
/// against the whole batch before moving to the next block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vectorized;

impl Backend for Vectorized {
    fn name(&self) -> &'static str {
        "vectorized"
    }

    fn assign(&self, batch: &[f32], centers: &Centers) -> Vec<Neighbor> {
        let rows = batch.len() / centers.dims().max(1);
        let mut best = vec![(0, Energy::INFINITY); rows];
        centers
            .blocks()
            .for_each(|block| centers.block(batch, block, &mut best));
        best
    }
}

/// Data-parallel evaluation across points on a dedicated rayon pool.
pub struct Accelerated {
    pool: rayon::ThreadPool,
}

impl Accelerated {
    /// Pool sized to the machine. Unavailable on a single core.
    pub fn new() -> Result<Self> {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        if threads < 2 {
            return Err(Error::BackendUnavailable {
                backend: "accelerated",
                reason: format!("{} worker thread(s)", threads),
            });
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("assign-{}", i))
            .build()
            .map(|pool| Self { pool })
            .map_err(|e| Error::BackendUnavailable {
                backend: "accelerated",
                reason: e.to_string(),
            })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Backend for Accelerated {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn assign(&self, batch: &[f32], centers: &Centers) -> Vec<Neighbor> {
        let dims = centers.dims().max(1);
        let rows = batch.len() / dims;
        let mut best = vec![(0, Energy::INFINITY); rows];
        self.pool.install(|| {
            batch
                .par_chunks(dims * ACCELERATED_ROWS)
                .zip(best.par_chunks_mut(ACCELERATED_ROWS))
                .for_each(|(points, best)| {
                    centers
                        .blocks()
                        .for_each(|block| centers.block(points, block, best))
                })
        });
        best
    }
}

/// Requested execution backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Accelerated when available, vectorized otherwise.
    #[default]
    Auto,
    Vectorized,
    Accelerated,
}

impl Device {
    /// Resolve the preference into a backend, falling back to the
    /// vectorized one when acceleration is unavailable.
    pub fn select(self) -> Box<dyn Backend> {
        self.select_with(num_cpus::get())
    }

    /// [`Self::select`] with an explicit worker count for the accelerated
    /// backend.
    pub fn select_with(self, threads: usize) -> Box<dyn Backend> {
        match self {
            Self::Vectorized => Box::new(Vectorized),
            Self::Auto => match Accelerated::with_threads(threads) {
                Ok(backend) => Box::new(backend),
                Err(e) => {
                    log::debug!("{:<32}{:<32}", "acceleration skipped", e);
                    Box::new(Vectorized)
                }
            },
            Self::Accelerated => match Accelerated::with_threads(threads) {
                Ok(backend) => Box::new(backend),
                Err(e) => {
                    log::warn!("{:<32}{:<32}", "falling back to vectorized", e);
                    Box::new(Vectorized)
                }
            },
        }
    }
}

impl std::str::FromStr for Device {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "vectorized" | "cpu" => Ok(Self::Vectorized),
            "accelerated" | "parallel" => Ok(Self::Accelerated),
            other => Err(Error::Config(format!("unknown device {:?}", other))),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Vectorized => write!(f, "vectorized"),
            Self::Accelerated => write!(f, "accelerated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    /// Exhaustive nearest center, straight from the definition.
    fn brute(points: &Matrix, centers: &Matrix) -> Vec<usize> {
        points
            .iter_rows()
            .map(|x| {
                centers
                    .iter_rows()
                    .map(|c| x.iter().zip(c).map(|(a, b)| (a - b) * (a - b)).sum::<f32>())
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                    .map(|(j, _)| j)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn vectorized_matches_definition() {
        let points = random_matrix(300, 12, 1);
        let centers = random_matrix(37, 12, 2);
        for chunk in [1, 5, 37, 1024] {
            let ref codebook = Centers::new(&centers, chunk);
            let found = Vectorized
                .assign(points.as_slice(), codebook)
                .into_iter()
                .map(|(j, _)| j)
                .collect::<Vec<_>>();
            assert_eq!(found, brute(&points, &centers), "chunk {}", chunk);
        }
    }

    #[test]
    fn backends_agree() {
        let points = random_matrix(500, 8, 3);
        let centers = random_matrix(20, 8, 4);
        let ref codebook = Centers::new(&centers, 7);
        let accelerated = Accelerated::with_threads(2).unwrap();
        assert_eq!(
            Vectorized.assign(points.as_slice(), codebook),
            accelerated.assign(points.as_slice(), codebook)
        );
    }

    #[test]
    fn distances_are_floored_at_zero() {
        let points = random_matrix(10, 4, 5);
        let ref codebook = Centers::new(&points, 3);
        Vectorized
            .assign(points.as_slice(), codebook)
            .into_iter()
            .enumerate()
            .for_each(|(i, (j, d2))| {
                assert!(d2 >= 0.);
                assert!(d2 < 1e-4);
                assert_eq!(i, j);
            });
    }

    #[test]
    fn ties_go_to_the_first_center() {
        let centers = Matrix::from_vec(3, 1, vec![1., -1., 1.]);
        let ref codebook = Centers::new(&centers, 1);
        let found = Vectorized.assign(&[0., 1.], codebook);
        assert_eq!(found, vec![(0, 1.), (0, 0.)]);
    }

    #[test]
    fn single_thread_is_unavailable() {
        let err = Accelerated::with_threads(1).err().unwrap();
        assert!(err.is_recoverable());
        assert_eq!(Device::Vectorized.select().name(), "vectorized");
    }

    #[test]
    fn unavailable_acceleration_falls_back() {
        assert_eq!(Device::Accelerated.select_with(1).name(), "vectorized");
        assert_eq!(Device::Auto.select_with(0).name(), "vectorized");
        assert_eq!(Device::Accelerated.select_with(2).name(), "accelerated");
        assert_eq!(Device::Auto.select_with(2).name(), "accelerated");
    }

    #[test]
    fn device_parsing() {
        assert_eq!("Auto".parse::<Device>().unwrap(), Device::Auto);
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Vectorized);
        assert!("cuda".parse::<Device>().is_err());
    }
}
