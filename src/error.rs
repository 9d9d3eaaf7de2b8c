use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between reading the table and writing buckets.
///
/// Variants fall into three classes, see [`Error::is_fatal`],
/// [`Error::is_group_local`] and [`Error::is_recoverable`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed table ({stage}): {reason}")]
    Format { stage: &'static str, reason: String },

    #[error("size mismatch ({stage}): declared {declared} bytes, found {actual}")]
    Size {
        stage: &'static str,
        declared: u64,
        actual: u64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("index out of range: {what} = {index}, limit {limit}")]
    Range {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("no hands of size {group}")]
    EmptyGroup { group: usize },

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: &'static str, reason: String },

    #[error("no-bet action not unique: {zeros} all-zero rows, chose {chosen}")]
    AmbiguousHeuristic { chosen: usize, zeros: usize },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest serialization: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Unrecoverable precondition failures that abort the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Format { .. } => true,
            Error::Size { .. } => true,
            Error::Config(_) => true,
            Error::Range { .. } => true,
            Error::Io { .. } => true,
            Error::Json(_) => true,
            Error::EmptyGroup { .. } => false,
            Error::BackendUnavailable { .. } => false,
            Error::AmbiguousHeuristic { .. } => false,
        }
    }

    /// Aborts a single hand-size group; the run continues with the next one.
    pub fn is_group_local(&self) -> bool {
        matches!(self, Error::EmptyGroup { .. })
    }

    /// Handled in place: a fallback backend or a best-effort guess.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::AmbiguousHeuristic { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn format(stage: &'static str, reason: impl Into<String>) -> Self {
        Error::Format {
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_exclusive() {
        let errors = [
            Error::format("header", "bad tag"),
            Error::Config(String::from("k = 0")),
            Error::EmptyGroup { group: 3 },
            Error::AmbiguousHeuristic { chosen: 0, zeros: 2 },
            Error::BackendUnavailable {
                backend: "accelerated",
                reason: String::from("single core"),
            },
        ];
        for e in errors.iter() {
            let classes = [e.is_fatal(), e.is_group_local(), e.is_recoverable()];
            assert_eq!(classes.iter().filter(|c| **c).count(), 1, "{}", e);
        }
    }

    #[test]
    fn messages_carry_parameters() {
        let e = Error::Range {
            what: "card",
            index: 9,
            limit: 9,
        };
        assert_eq!(e.to_string(), "index out of range: card = 9, limit 9");
        let e = Error::EmptyGroup { group: 5 };
        assert!(e.to_string().contains('5'));
    }
}
