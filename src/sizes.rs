use crate::*;
use byteorder::LE;
use byteorder::ReadBytesExt;
use std::path::Path;

/// Cardinality of every hand index, `0..=HAND_MAX`.
///
/// Built either from one byte per hand or from one 24-bit card mask per hand
/// (stored as little-endian u32, high byte ignored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandSizes(Vec<u8>);

impl TryFrom<Vec<u8>> for HandSizes {
    type Error = Error;
    fn try_from(sizes: Vec<u8>) -> Result<Self> {
        match sizes.iter().position(|&n| n as usize > HAND_MAX) {
            Some(hand) => Err(Error::format(
                "hand sizes",
                format!("hand {} has size {} > {}", hand, sizes[hand], HAND_MAX),
            )),
            None => Ok(Self(sizes)),
        }
    }
}

impl HandSizes {
    /// Sizes by popcount of the low 24 bits of each mask.
    pub fn from_masks(masks: &[u32]) -> Result<Self> {
        masks
            .iter()
            .map(|m| (m & MASK_BITS).count_ones() as u8)
            .collect::<Vec<u8>>()
            .try_into()
    }

    /// Read a one-byte-per-hand size file.
    pub fn load_sizes(path: &Path) -> Result<Self> {
        log::info!("{:<32}{:<32}", "loading hand sizes", path.display());
        std::fs::read(path).map_err(Error::io(path))?.try_into()
    }

    /// Read a little-endian u32-per-hand mask file.
    pub fn load_masks(path: &Path) -> Result<Self> {
        log::info!("{:<32}{:<32}", "loading hand masks", path.display());
        let bytes = std::fs::read(path).map_err(Error::io(path))?;
        if bytes.len() % 4 != 0 {
            return Err(Error::format(
                "hand masks",
                format!("{} bytes is not a whole number of u32 masks", bytes.len()),
            ));
        }
        let mut masks = vec![0u32; bytes.len() / 4];
        (&bytes[..])
            .read_u32_into::<LE>(&mut masks)
            .map_err(Error::io(path))?;
        Self::from_masks(&masks)
    }

    pub fn load(source: &HandSource) -> Result<Self> {
        match source {
            HandSource::Sizes(path) => Self::load_sizes(path),
            HandSource::Masks(path) => Self::load_masks(path),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn size(&self, hand: usize) -> Option<usize> {
        self.0.get(hand).map(|&n| n as usize)
    }

    /// Hand indices of the given size, ascending.
    pub fn indices(&self, n: usize) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, s)| **s as usize == n)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn population(&self, n: usize) -> usize {
        self.0.iter().filter(|s| **s as usize == n).count()
    }

    /// Population of every size `0..=HAND_MAX`.
    pub fn histogram(&self) -> [usize; HAND_MAX + 1] {
        let mut histogram = [0; HAND_MAX + 1];
        self.0.iter().for_each(|&n| histogram[n as usize] += 1);
        histogram
    }

    /// Every hand of the table must have exactly one size.
    pub fn check(&self, table: &ProbabilityTable) -> Result<()> {
        if self.len() == table.hands() {
            Ok(())
        } else {
            Err(Error::Size {
                stage: "hand sizes",
                declared: table.hands() as u64,
                actual: self.len() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_count_low_bits_only() {
        let masks = [0b0, 0b1, 0b1011, 0xFF00_0001, 0x00FF_FFC0];
        let sizes = HandSizes::from_masks(&masks[..4]).unwrap();
        assert_eq!(sizes.size(0), Some(0));
        assert_eq!(sizes.size(1), Some(1));
        assert_eq!(sizes.size(2), Some(3));
        assert_eq!(sizes.size(3), Some(1));
        assert!(HandSizes::from_masks(&masks[4..]).is_err());
    }

    #[test]
    fn rejects_oversized_hands() {
        let err = HandSizes::try_from(vec![1, 2, 7]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn groups_and_histogram() {
        let sizes = HandSizes::try_from(vec![0, 1, 2, 1, 2, 2, 6]).unwrap();
        assert_eq!(sizes.indices(2), vec![2, 4, 5]);
        assert_eq!(sizes.population(1), 2);
        assert_eq!(sizes.population(3), 0);
        assert_eq!(sizes.histogram(), [1, 2, 3, 0, 0, 0, 1]);
    }

    #[test]
    fn loads_both_file_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let ref sizes = dir.path().join("sizes.bin");
        let ref masks = dir.path().join("masks.bin");
        std::fs::write(sizes, [1u8, 2, 2]).unwrap();
        let bytes = [0b1u32, 0b11, 0b101]
            .iter()
            .flat_map(|m| m.to_le_bytes())
            .collect::<Vec<u8>>();
        std::fs::write(masks, bytes).unwrap();
        let a = HandSizes::load(&HandSource::Sizes(sizes.clone())).unwrap();
        let b = HandSizes::load(&HandSource::Masks(masks.clone())).unwrap();
        assert_eq!(a, b);
        std::fs::write(masks, [0u8; 5]).unwrap();
        assert!(HandSizes::load_masks(masks).is_err());
    }
}
