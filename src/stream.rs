//! Lazy citation stream over one or more XML sources.

use crate::assemble::assemble;
use crate::error::{Error, Result};
use crate::filter::{version_marker, VersionPolicy};
use crate::mapper::map_citation;
use crate::models::{Citation, Pmid};
use crate::parser::{CitationReader, RawRecord};
use crate::stats::IngestStats;
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::PathBuf;
use tracing::{debug, info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Where citation XML comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Plain or gzip-compressed XML file
    File(PathBuf),
    /// Bytes already in memory, e.g. an eUtils response
    Memory { name: String, bytes: Vec<u8> },
}

impl Source {
    pub fn name(&self) -> String {
        match self {
            Source::File(path) => path.display().to_string(),
            Source::Memory { name, .. } => name.clone(),
        }
    }

    /// Opens the source, transparently decompressing gzip input.
    pub fn open(self) -> Result<Box<dyn BufRead>> {
        match self {
            Source::File(path) => {
                let file = File::open(&path).map_err(|source| Error::File {
                    path: path.clone(),
                    source,
                })?;
                let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
                let gzipped = path.extension().is_some_and(|ext| ext == "gz")
                    || reader
                        .fill_buf()
                        .map_err(|source| Error::File {
                            path: path.clone(),
                            source,
                        })?
                        .starts_with(&GZIP_MAGIC);
                if gzipped {
                    debug!(path = %path.display(), "Decompressing gzip input");
                    Ok(Box::new(BufReader::with_capacity(
                        READ_BUFFER_SIZE,
                        MultiGzDecoder::new(reader),
                    )))
                } else {
                    Ok(Box::new(reader))
                }
            }
            Source::Memory { bytes, .. } => {
                if bytes.starts_with(&GZIP_MAGIC) {
                    Ok(Box::new(BufReader::new(MultiGzDecoder::new(Cursor::new(
                        bytes,
                    )))))
                } else {
                    Ok(Box::new(Cursor::new(bytes)))
                }
            }
        }
    }
}

/// Single-pass sequence of assembled citations.
///
/// Structural problems skip the affected citation; I/O and XML syntax errors
/// are yielded as `Err`. `DeleteCitation` PMIDs are collected on the side.
pub struct CitationStream {
    sources: std::vec::IntoIter<Source>,
    current: Option<(String, CitationReader<Box<dyn BufRead>>)>,
    policy: VersionPolicy,
    deletions: Vec<Pmid>,
    stats: IngestStats,
}

impl CitationStream {
    pub fn new(sources: Vec<Source>, policy: VersionPolicy) -> Self {
        Self {
            sources: sources.into_iter(),
            current: None,
            policy,
            deletions: Vec::new(),
            stats: IngestStats::new(),
        }
    }

    /// PMIDs from `DeleteCitation` elements seen so far
    pub fn deletions(&self) -> &[Pmid] {
        &self.deletions
    }

    pub fn into_deletions(self) -> Vec<Pmid> {
        self.deletions
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    fn open_next(&mut self) -> Option<Result<()>> {
        let source = self.sources.next()?;
        let name = source.name();
        match source.open() {
            Ok(reader) => {
                info!(source = %name, "Reading citations");
                self.stats.inc_sources();
                self.current = Some((name, CitationReader::new(reader)));
                Some(Ok(()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl Iterator for CitationStream {
    type Item = Result<Citation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                if let Err(e) = self.open_next()? {
                    return Some(Err(e));
                }
            }
            let Some((name, reader)) = self.current.as_mut() else {
                continue;
            };

            match reader.next() {
                None => {
                    self.current = None;
                }
                Some(Err(e)) => {
                    self.current = None;
                    return Some(Err(e));
                }
                Some(Ok(RawRecord::Deletion(pmids))) => {
                    debug!(source = %name, count = pmids.len(), "DeleteCitation");
                    self.stats.add_deletions(pmids.len() as u64);
                    self.deletions.extend(pmids);
                }
                Some(Ok(RawRecord::Citation(element))) => {
                    let marker = version_marker(&element);
                    if !self.policy.accepts(marker) {
                        debug!(source = %name, version = ?marker, "Skipping citation version");
                        self.stats.inc_skipped();
                        continue;
                    }
                    match map_citation(&element).and_then(assemble) {
                        Ok(citation) => {
                            self.stats.inc_citations();
                            return Some(Ok(citation));
                        }
                        Err(e) if e.is_per_record() => {
                            warn!(source = %name, "Skipping citation: {}", e);
                            self.stats.inc_invalid();
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}
