//! Error taxonomy for parsing, storing and writing citations

use crate::models::Pmid;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory value is missing; only the affected citation is skipped
    #[error("invalid citation{}: {reason}", .pmid.map(|p| format!(" {p}")).unwrap_or_default())]
    Structural { pmid: Option<Pmid>, reason: String },

    /// `create` on an identifier that is already stored
    #[error("citation {0} already exists")]
    Duplicate(Pmid),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: usize,
        source: quick_xml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("MEDLINE line {line}: {message}")]
    Native { line: usize, message: String },
}

impl Error {
    pub fn structural(pmid: Option<Pmid>, reason: impl Into<String>) -> Self {
        Error::Structural {
            pmid,
            reason: reason.into(),
        }
    }

    /// Per-record problems that must not abort a batch.
    pub fn is_per_record(&self) -> bool {
        matches!(self, Error::Structural { .. } | Error::Duplicate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_message_names_pmid() {
        let e = Error::structural(Some(123), "missing journal");
        assert_eq!(e.to_string(), "invalid citation 123: missing journal");
        let e = Error::structural(None, "missing PMID");
        assert_eq!(e.to_string(), "invalid citation: missing PMID");
    }

    #[test]
    fn per_record_errors() {
        assert!(Error::Duplicate(1).is_per_record());
        assert!(Error::structural(None, "x").is_per_record());
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!io.is_per_record());
    }
}
