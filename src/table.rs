//! Reader and writer for the `TTP0` probability-count table.
//!
//! Layout, all little-endian:
//!
//! ```text
//! "TTP0" | version u32 | actions u32 | cards u32 | hands u32 | i32 counts[actions][cards][hands]
//! ```
use crate::*;
use byteorder::LE;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;

/// Fixed 20-byte preamble of a probability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Header {
    pub version: u32,
    /// Bid categories, including the no-bet action.
    pub actions: u32,
    /// Card-count slots; `cards - 1` is the largest total card count.
    pub cards: u32,
    pub hands: u32,
}

impl Header {
    /// Parses tag and header fields. Any short read is a truncated header.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let truncated = |_| Error::format("header", "truncated header");
        let ref mut magic = [0u8; 4];
        reader.read_exact(magic).map_err(truncated)?;
        if magic != TABLE_MAGIC {
            return Err(Error::format(
                "header",
                format!("bad tag {:?}, expected {:?}", magic, TABLE_MAGIC),
            ));
        }
        let version = reader.read_u32::<LE>().map_err(truncated)?;
        let actions = reader.read_u32::<LE>().map_err(truncated)?;
        let cards = reader.read_u32::<LE>().map_err(truncated)?;
        let hands = reader.read_u32::<LE>().map_err(truncated)?;
        let header = Self {
            version,
            actions,
            cards,
            hands,
        };
        header.validate()?;
        Ok(header)
    }

    /// Every dimension is nonzero and the payload is addressable.
    pub fn validate(&self) -> Result<()> {
        if self.actions == 0 || self.cards == 0 || self.hands == 0 {
            return Err(Error::format(
                "header",
                format!("empty dimension in {:?}", self),
            ));
        }
        self.cells()
            .and_then(|n| n.checked_mul(4))
            .filter(|bytes| usize::try_from(*bytes).is_ok())
            .map(|_| ())
            .ok_or_else(|| {
                Error::format(
                    "header",
                    format!("dimensions overflow the payload size in {:?}", self),
                )
            })
    }

    fn cells(&self) -> Option<u64> {
        (self.actions as u64)
            .checked_mul(self.cards as u64)
            .and_then(|n| n.checked_mul(self.hands as u64))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(TABLE_MAGIC)?;
        writer.write_u32::<LE>(self.version)?;
        writer.write_u32::<LE>(self.actions)?;
        writer.write_u32::<LE>(self.cards)?;
        writer.write_u32::<LE>(self.hands)?;
        Ok(())
    }

    /// Number of i32 cells the payload must hold. Saturates on headers
    /// that fail [`Self::validate`].
    pub fn len(&self) -> usize {
        self.cells()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX)
    }

    /// Declared payload size in bytes. Saturates like [`Self::len`].
    pub fn payload_bytes(&self) -> u64 {
        self.cells()
            .and_then(|n| n.checked_mul(4))
            .unwrap_or(u64::MAX)
    }

    /// Warn about values the production table never carries.
    fn inspect(&self) {
        if !(1..=10).contains(&self.version) {
            log::warn!("{:<32}{:<32}", "unusual table version", self.version);
        }
        if self.cards != TABLE_CARDS {
            log::warn!(
                "{:<32}{:<32}",
                "unusual card dimension",
                format!("{} (expected {})", self.cards, TABLE_CARDS)
            );
        }
    }
}

/// Outcome of the no-bet heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Exactly one action sums to zero.
    Unique(usize),
    /// No unique all-zero action; `chosen` has the smallest sum.
    Ambiguous { chosen: usize, zeros: usize },
}

impl Detection {
    pub fn action(&self) -> usize {
        match self {
            Self::Unique(action) => *action,
            Self::Ambiguous { chosen, .. } => *chosen,
        }
    }

    /// The non-fatal diagnostic a caller should surface, if any.
    pub fn diagnostic(&self) -> Option<Error> {
        match *self {
            Self::Unique(_) => None,
            Self::Ambiguous { chosen, zeros } => Some(Error::AmbiguousHeuristic { chosen, zeros }),
        }
    }
}

/// Counts of satisfied bids, indexed `[action][cards][hand]`.
///
/// `counts[b][c][h]` is the number of `c`-card deals containing hand `h`
/// in which bid `b` holds. Read-only after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbabilityTable {
    header: Header,
    counts: Vec<i32>,
}

impl ProbabilityTable {
    pub fn new(header: Header, counts: Vec<i32>) -> Result<Self> {
        header.validate()?;
        if counts.len() != header.len() {
            return Err(Error::Size {
                stage: "payload",
                declared: header.payload_bytes(),
                actual: counts.len() as u64 * 4,
            });
        }
        Ok(Self { header, counts })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
    pub fn actions(&self) -> usize {
        self.header.actions as usize
    }
    pub fn cards(&self) -> usize {
        self.header.cards as usize
    }
    pub fn hands(&self) -> usize {
        self.header.hands as usize
    }

    /// Counts of one action at one card total, across every hand.
    pub fn row(&self, action: usize, cards: usize) -> Result<&[i32]> {
        self.check("action", action, self.actions())?;
        self.check("card", cards, self.cards())?;
        let start = (action * self.cards() + cards) * self.hands();
        Ok(&self.counts[start..start + self.hands()])
    }

    pub fn count(&self, action: usize, cards: usize, hand: usize) -> Result<i32> {
        self.check("hand", hand, self.hands())?;
        Ok(self.row(action, cards)?[hand])
    }

    /// Total count per action over all card totals and hands.
    pub fn sums(&self) -> Vec<i64> {
        self.counts
            .par_chunks(self.cards() * self.hands())
            .map(|block| block.iter().map(|&c| c as i64).sum::<i64>())
            .collect()
    }

    /// Identify the no-bet action: the only row that never counts anything.
    ///
    /// When zero or several rows sum to zero this falls back to the first
    /// row with the smallest sum, reported as [`Detection::Ambiguous`].
    pub fn detect(&self) -> Detection {
        let sums = self.sums();
        let zeros = sums.iter().filter(|s| **s == 0).count();
        let chosen = sums
            .iter()
            .enumerate()
            .min_by_key(|(i, s)| (**s, *i))
            .map(|(i, _)| i)
            .unwrap_or_default();
        match zeros {
            1 => Detection::Unique(chosen),
            _ => Detection::Ambiguous { chosen, zeros },
        }
    }

    /// Parse an in-memory table image.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let ref mut reader = &bytes[..];
        let header = Header::read(reader)?;
        let available = reader.len() as u64;
        Self::payload(header, reader, available)
    }

    pub fn load(path: &Path) -> Result<Self> {
        log::info!("{:<32}{:<32}", "loading probability table", path.display());
        let file = File::open(path).map_err(Error::io(path))?;
        let size = file.metadata().map_err(Error::io(path))?.len();
        let ref mut reader = BufReader::new(file);
        let header = Header::read(reader)?;
        let table = Self::payload(header, reader, size.saturating_sub(TABLE_HEADER_BYTES as u64))?;
        log::info!(
            "{:<32}{:<32}",
            "table header",
            format!(
                "v{} actions={} cards={} hands={}",
                header.version, header.actions, header.cards, header.hands
            )
        );
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        log::info!("{:<32}{:<32}", "saving probability table", path.display());
        let file = File::create(path).map_err(Error::io(path))?;
        let ref mut writer = BufWriter::new(file);
        self.write(writer)
            .and_then(|_| writer.flush())
            .map_err(Error::io(path))
    }

    /// Serialize header and payload; the inverse of [`Self::parse`].
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.header.write(writer)?;
        self.counts
            .iter()
            .try_for_each(|&c| writer.write_i32::<LE>(c))
    }

    fn payload<R: Read>(header: Header, reader: &mut R, available: u64) -> Result<Self> {
        header.inspect();
        if available != header.payload_bytes() {
            return Err(Error::Size {
                stage: "payload",
                declared: header.payload_bytes(),
                actual: available,
            });
        }
        let mut counts = vec![0i32; header.len()];
        reader
            .read_i32_into::<LE>(&mut counts)
            .map_err(|e| Error::format("payload", e.to_string()))?;
        Self::new(header, counts)
    }

    fn check(&self, what: &'static str, index: usize, limit: usize) -> Result<()> {
        if index < limit {
            Ok(())
        } else {
            Err(Error::Range { what, index, limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn roundtrip_is_byte_identical() {
        let table = fixture_table();
        let mut bytes = Vec::new();
        table.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), TABLE_HEADER_BYTES + table.header().len() * 4);
        let parsed = ProbabilityTable::parse(&bytes).unwrap();
        let mut again = Vec::new();
        parsed.write(&mut again).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(again, bytes);
    }

    #[test]
    fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ref path = dir.path().join("p.ttp0");
        let table = fixture_table();
        table.save(path).unwrap();
        assert_eq!(ProbabilityTable::load(path).unwrap(), table);
    }

    #[test]
    fn rejects_bad_tag() {
        let mut bytes = Vec::new();
        fixture_table().write(&mut bytes).unwrap();
        bytes[3] = b'1';
        let err = ProbabilityTable::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn rejects_truncated_header() {
        let mut bytes = Vec::new();
        fixture_table().write(&mut bytes).unwrap();
        let err = ProbabilityTable::parse(&bytes[..12]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    fn header_bytes(actions: u32, cards: u32, hands: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        Header {
            version: 1,
            actions,
            cards,
            hands,
        }
        .write(&mut bytes)
        .unwrap();
        bytes
    }

    #[test]
    fn rejects_overflowing_dimensions() {
        let bytes = header_bytes(u32::MAX, u32::MAX, u32::MAX);
        let err = ProbabilityTable::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Format { stage: "header", .. }));
        let bytes = header_bytes(1 << 31, 1 << 31, 1);
        let err = ProbabilityTable::parse(&bytes).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn oversized_header_without_payload_is_a_size_mismatch() {
        let bytes = header_bytes(1 << 20, 1 << 20, 4);
        let err = ProbabilityTable::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Size { actual: 0, .. }));
    }

    #[test]
    fn constructor_rejects_empty_dimensions() {
        for (actions, cards, hands) in [(0, 2, 2), (2, 0, 2), (2, 2, 0)] {
            let header = Header {
                version: 1,
                actions,
                cards,
                hands,
            };
            let err = ProbabilityTable::new(header, vec![]).unwrap_err();
            assert!(matches!(err, Error::Format { stage: "header", .. }));
        }
    }

    #[test]
    fn rejects_short_and_long_payloads() {
        let mut bytes = Vec::new();
        fixture_table().write(&mut bytes).unwrap();
        let short = ProbabilityTable::parse(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(short, Error::Size { .. }));
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let long = ProbabilityTable::parse(&bytes).unwrap_err();
        assert!(matches!(long, Error::Size { .. }));
    }

    #[test]
    fn accessor_is_bounds_checked() {
        let table = fixture_table();
        assert!(table.count(1, 2, 0).is_ok());
        let err = table.count(0, table.cards(), 0).unwrap_err();
        assert!(matches!(err, Error::Range { what: "card", .. }));
        let err = table.count(0, 0, table.hands()).unwrap_err();
        assert!(matches!(err, Error::Range { what: "hand", .. }));
    }

    #[test]
    fn detects_unique_zero_row() {
        let table = fixture_table();
        let detection = table.detect();
        assert_eq!(detection, Detection::Unique(FIXTURE_NO_BET));
        assert!(detection.diagnostic().is_none());
    }

    #[test]
    fn ambiguous_detection_falls_back_to_argmin() {
        let header = Header {
            version: 1,
            actions: 3,
            cards: 1,
            hands: 2,
        };
        let table = ProbabilityTable::new(header, vec![4, 1, 0, 0, 0, 0]).unwrap();
        let detection = table.detect();
        assert_eq!(detection, Detection::Ambiguous { chosen: 1, zeros: 2 });
        assert!(matches!(
            detection.diagnostic(),
            Some(Error::AmbiguousHeuristic { chosen: 1, zeros: 2 })
        ));
        let table = ProbabilityTable::new(header, vec![4, 1, 2, 2, 1, 1]).unwrap();
        assert_eq!(table.detect(), Detection::Ambiguous { chosen: 2, zeros: 0 });
    }
}
