use crate::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

/// Hyperparameters of a mini-batch k-means run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schedule {
    /// Full passes before the final assignment. No early stopping.
    pub iterations: usize,
    /// Points per streamed minibatch.
    pub batch: usize,
    /// Centers per distance block.
    pub chunk: usize,
    pub seed: u64,
    /// Move empty clusters onto a random point after each pass.
    pub reinit: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            iterations: KMEANS_ITERATIONS,
            batch: KMEANS_BATCH_SIZE,
            chunk: KMEANS_CENTER_CHUNK,
            seed: KMEANS_SEED,
            reinit: true,
        }
    }
}

/// Lifecycle of a [`MiniBatch`] run. [`MiniBatch::finish`] consumes the
/// run, so the finalized state is the returned [`Clustering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    /// Index of the last completed pass.
    Iterating(usize),
}

/// Per-cluster sums and counts over some set of points.
///
/// Minibatches each produce one and the pass folds them in order, so the
/// centers only move once per pass.
#[derive(Debug, Clone)]
pub struct Partial {
    dims: usize,
    sums: Vec<f64>,
    counts: Vec<usize>,
    inertia: f64,
}

impl Partial {
    pub fn zeros(k: usize, dims: usize) -> Self {
        Self {
            dims,
            sums: vec![0.; k * dims],
            counts: vec![0; k],
            inertia: 0.,
        }
    }

    pub fn witness(&mut self, j: usize, x: &[f32], d2: Energy) {
        self.sums[j * self.dims..(j + 1) * self.dims]
            .iter_mut()
            .zip(x.iter())
            .for_each(|(s, x)| *s += *x as f64);
        self.counts[j] += 1;
        self.inertia += d2 as f64;
    }

    pub fn absorb(mut self, other: Self) -> Self {
        self.sums
            .iter_mut()
            .zip(other.sums.iter())
            .for_each(|(a, b)| *a += b);
        self.counts
            .iter_mut()
            .zip(other.counts.iter())
            .for_each(|(a, b)| *a += b);
        self.inertia += other.inertia;
        self
    }

    pub fn count(&self, j: usize) -> usize {
        self.counts[j]
    }

    /// Mean of cluster `j`, or `None` if nothing landed there.
    pub fn mean(&self, j: usize) -> Option<impl Iterator<Item = f32> + '_> {
        let n = self.counts[j];
        (n > 0).then(|| {
            self.sums[j * self.dims..(j + 1) * self.dims]
                .iter()
                .map(move |s| (s / n as f64) as f32)
        })
    }
}

/// Summary of one completed pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pass {
    pub index: usize,
    pub inertia: f64,
    pub empty: usize,
}

/// Labels and centers produced for one hand-size group.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// `K × D` in normalized space; empty under the identity mapping.
    pub centers: Matrix,
    /// Cluster of every point, in input order.
    pub labels: Vec<u32>,
    /// Sum of squared distances to the assigned centers.
    pub inertia: f64,
}

impl Clustering {
    /// Every point is its own bucket.
    pub fn identity(n: usize) -> Self {
        Self {
            centers: Matrix::default(),
            labels: (0..n as u32).collect(),
            inertia: 0.,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.centers.is_empty()
    }

    /// Number of points per cluster.
    pub fn populations(&self) -> Vec<usize> {
        let k = self
            .centers
            .rows()
            .max(self.labels.iter().map(|&l| l as usize + 1).max().unwrap_or(0));
        let mut populations = vec![0; k];
        self.labels
            .iter()
            .for_each(|&l| populations[l as usize] += 1);
        populations
    }
}

/// Streaming k-means over the rows of a matrix.
///
/// Each pass shuffles the points, streams them in minibatches, assigns each
/// to its nearest *current* center, and folds per-minibatch [`Partial`]s into
/// one pass total. Centers move only after the pass: populated clusters go to
/// their mean, empty ones to a random point. A final ordered sweep against
/// the settled centers yields the labels.
pub struct MiniBatch<'a> {
    points: &'a Matrix,
    k: usize,
    schedule: &'a Schedule,
    backend: &'a dyn Backend,
    rng: SmallRng,
    centers: Matrix,
    phase: Phase,
}

impl<'a> MiniBatch<'a> {
    pub fn new(
        points: &'a Matrix,
        k: usize,
        schedule: &'a Schedule,
        backend: &'a dyn Backend,
    ) -> Self {
        Self {
            points,
            k,
            schedule,
            backend,
            rng: SmallRng::seed_from_u64(schedule.seed),
            centers: Matrix::default(),
            phase: Phase::Uninitialized,
        }
    }

    /// Cluster `points` into `k` groups, or one group per point if `k >= n`.
    pub fn fit(
        points: &Matrix,
        k: usize,
        schedule: &Schedule,
        backend: &dyn Backend,
    ) -> Result<Clustering> {
        if k >= points.rows() {
            log::info!("{:<32}{:<32}", "identity buckets", points.rows());
            return Ok(Clustering::identity(points.rows()));
        }
        let mut kmeans = MiniBatch::new(points, k, schedule, backend);
        kmeans.init()?;
        for _ in 0..schedule.iterations {
            let pass = kmeans.step()?;
            log::debug!(
                "{:<32}{:<32}",
                format!("pass {:>4}", pass.index),
                format!("inertia {:.6} empty {}", pass.inertia, pass.empty)
            );
        }
        Ok(kmeans.finish())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn centers(&self) -> &Matrix {
        &self.centers
    }

    /// Pick `k` distinct points uniformly at random as the first centers.
    pub fn init(&mut self) -> Result<()> {
        let n = self.points.rows();
        if self.k == 0 || self.k > n {
            return Err(Error::Config(format!(
                "cannot seed {} clusters from {} points",
                self.k, n
            )));
        }
        let chosen = rand::seq::index::sample(&mut self.rng, n, self.k).into_vec();
        self.centers = self.points.gather(&chosen);
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// One full pass over the points; centers move once at the end.
    pub fn step(&mut self) -> Result<Pass> {
        let index = match self.phase {
            Phase::Initialized => 0,
            Phase::Iterating(i) => i + 1,
            Phase::Uninitialized => {
                return Err(Error::Config(String::from("k-means pass before initialization")));
            }
        };
        let mut order = (0..self.points.rows()).collect::<Vec<usize>>();
        order.shuffle(&mut self.rng);
        let total = {
            let ref centers = Centers::new(&self.centers, self.schedule.chunk);
            order
                .chunks(self.schedule.batch.max(1))
                .map(|indices| self.partial(&self.points.gather(indices), centers))
                .fold(Partial::zeros(self.k, self.points.cols()), Partial::absorb)
        };
        let empty = self.update(&total, index);
        self.phase = Phase::Iterating(index);
        Ok(Pass {
            index,
            inertia: total.inertia,
            empty,
        })
    }

    /// Label every point, in input order, against the final centers.
    pub fn finish(self) -> Clustering {
        let ref centers = Centers::new(&self.centers, self.schedule.chunk);
        let mut labels = Vec::with_capacity(self.points.rows());
        let mut inertia = 0.;
        for start in (0..self.points.rows()).step_by(self.schedule.batch.max(1)) {
            let end = (start + self.schedule.batch.max(1)).min(self.points.rows());
            let batch = &self.points.as_slice()[start * self.points.cols()..end * self.points.cols()];
            for (j, d2) in self.backend.assign(batch, centers) {
                labels.push(j as u32);
                inertia += d2 as f64;
            }
        }
        Clustering {
            centers: self.centers,
            labels,
            inertia,
        }
    }

    /// Assign one minibatch and return its local sums and counts.
    fn partial(&self, batch: &Matrix, centers: &Centers) -> Partial {
        let mut partial = Partial::zeros(self.k, batch.cols());
        self.backend
            .assign(batch.as_slice(), centers)
            .into_iter()
            .zip(batch.iter_rows())
            .for_each(|((j, d2), x)| partial.witness(j, x, d2));
        partial
    }

    /// Move centers to their pass means; returns how many were empty.
    fn update(&mut self, total: &Partial, index: usize) -> usize {
        let mut empties = Vec::new();
        for j in 0..self.k {
            match total.mean(j) {
                Some(mean) => self
                    .centers
                    .row_mut(j)
                    .iter_mut()
                    .zip(mean)
                    .for_each(|(c, m)| *c = m),
                None => empties.push(j),
            }
        }
        if self.schedule.reinit && !empties.is_empty() {
            let ref mut rng = SmallRng::seed_from_u64(self.schedule.seed.wrapping_add(index as u64));
            for &j in empties.iter() {
                let i = rng.random_range(0..self.points.rows());
                self.centers.row_mut(j).copy_from_slice(self.points.row(i));
            }
        }
        empties.len()
    }
}
