use crate::*;

/// Marks a hand no group has claimed.
pub const UNCOVERED: i32 = -1;

/// Global mapping from hand index to bucket id within its size group.
///
/// Bucket ids are local to a group: hand size and bucket id together
/// identify a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets(Vec<i32>);

impl Buckets {
    pub fn new(hands: usize) -> Self {
        Self(vec![UNCOVERED; hands])
    }

    /// Write one group's labels at its original hand indices.
    pub fn absorb(&mut self, hands: &[usize], labels: &[u32]) -> Result<()> {
        if hands.len() != labels.len() {
            return Err(Error::Config(format!(
                "{} hands but {} labels",
                hands.len(),
                labels.len()
            )));
        }
        for (&hand, &label) in hands.iter().zip(labels.iter()) {
            let limit = self.0.len();
            let slot = self.0.get_mut(hand).ok_or(Error::Range {
                what: "hand",
                index: hand,
                limit,
            })?;
            *slot = label as i32;
        }
        Ok(())
    }

    /// Hands still at the sentinel.
    pub fn uncovered(&self) -> usize {
        self.0.iter().filter(|b| **b == UNCOVERED).count()
    }

    pub fn get(&self, hand: usize) -> Option<i32> {
        self.0.get(hand).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }
}

impl From<Buckets> for Vec<i32> {
    fn from(buckets: Buckets) -> Self {
        buckets.0
    }
}
