use crate::*;
use rayon::prelude::*;

/// Feature rows for every hand of one size.
///
/// Row `r` describes hand `hands[r]`. Columns are grouped by opponent size,
/// `n_opp = 1..=6`, and within a group run over every action except no-bet:
///
/// ```text
/// x[r][(n_opp - 1) * B + b] = counts[b][n_me + n_opp][hand] / C(24 - n_me, n_opp)
/// ```
///
/// i.e. the probability that bid `b` holds in a deal where we hold `n_me`
/// cards and the opponent holds `n_opp`.
#[derive(Debug, Clone)]
pub struct Features {
    group: usize,
    hands: Vec<usize>,
    matrix: Matrix,
}

impl Features {
    pub fn build(
        table: &ProbabilityTable,
        sizes: &HandSizes,
        group: usize,
        no_bet: usize,
        binomial: &Binomial,
    ) -> Result<Self> {
        if !GROUPS.contains(&group) {
            return Err(Error::Range {
                what: "hand size",
                index: group,
                limit: HAND_MAX + 1,
            });
        }
        if no_bet >= table.actions() {
            return Err(Error::Range {
                what: "no-bet action",
                index: no_bet,
                limit: table.actions(),
            });
        }
        let hands = sizes.indices(group);
        if hands.is_empty() {
            return Err(Error::EmptyGroup { group });
        }
        let columns = Self::columns(table, group, no_bet, binomial)?;
        let width = columns.len();
        let mut matrix = Matrix::zeros(hands.len(), width);
        matrix
            .as_mut_slice()
            .par_chunks_mut(width)
            .zip(hands.par_iter())
            .try_for_each(|(row, &hand)| {
                row.iter_mut()
                    .zip(columns.iter())
                    .try_for_each(|(x, (counts, denominator))| {
                        let count = counts[hand];
                        let p = count as f64 / denominator;
                        if count < 0 || p > 1. {
                            Err(Error::format(
                                "features",
                                format!("hand {} has count {} over {}", hand, count, denominator),
                            ))
                        } else {
                            *x = p as Probability;
                            Ok(())
                        }
                    })
            })?;
        Ok(Self {
            group,
            hands,
            matrix,
        })
    }

    /// Count rows and denominators in column order.
    fn columns<'t>(
        table: &'t ProbabilityTable,
        group: usize,
        no_bet: usize,
        binomial: &Binomial,
    ) -> Result<Vec<(&'t [i32], f64)>> {
        let mut columns = Vec::with_capacity(Self::width(table.actions()));
        for opponent in OPPONENTS {
            let cards = group + opponent;
            if cards >= table.cards() {
                return Err(Error::Range {
                    what: "card total",
                    index: cards,
                    limit: table.cards(),
                });
            }
            let denominator = binomial.get(DECK_SIZE - group, opponent);
            for action in (0..table.actions()).filter(|a| *a != no_bet) {
                columns.push((table.row(action, cards)?, denominator));
            }
        }
        Ok(columns)
    }

    /// Feature width for a table with `actions` actions (408 for 69).
    pub fn width(actions: usize) -> usize {
        actions.saturating_sub(1) * OPPONENTS.count()
    }

    pub fn group(&self) -> usize {
        self.group
    }
    pub fn hands(&self) -> &[usize] {
        &self.hands
    }
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }
    pub fn matrix_mut(&mut self) -> &mut Matrix {
        &mut self.matrix
    }
    pub fn into_parts(self) -> (Matrix, Vec<usize>) {
        (self.matrix, self.hands)
    }
}
