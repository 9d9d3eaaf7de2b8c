/// Binomial coefficients `C(n, k)` for `0 <= n, k <= max`.
///
/// Built with Pascal's rule in f64. Everything up to `C(24, 12)` is an
/// integer far below 2^53, so the table is exact at deck scale.
#[derive(Debug, Clone)]
pub struct Binomial {
    max: usize,
    table: Vec<f64>,
}

impl Binomial {
    pub fn build(max: usize) -> Self {
        let width = max + 1;
        let mut table = vec![0.; width * width];
        for n in 0..=max {
            table[n * width] = 1.;
            for k in 1..=n {
                table[n * width + k] = table[(n - 1) * width + k - 1] + table[(n - 1) * width + k];
            }
        }
        Self { max, table }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// `C(n, k)`, zero when `k > n`. Panics past the precomputed range.
    pub fn get(&self, n: usize, k: usize) -> f64 {
        assert!(n <= self.max && k <= self.max, "C({}, {}) beyond {}", n, k, self.max);
        self.table[n * (self.max + 1) + k]
    }
}

impl Default for Binomial {
    fn default() -> Self {
        Self::build(crate::DECK_SIZE)
    }
}
