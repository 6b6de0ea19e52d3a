//! Medic: MEDLINE/PubMed citation normalization and serialization
//!
//! This crate turns MEDLINE/PubMed XML citations into a relational entity graph
//! and writes that graph back out in several flat-text formats:
//!
//! 1. **Parsing** -- Stream `MedlineCitation`/`PubmedArticle` subtrees and
//!    `DeleteCitation` markers out of plain or gzipped XML, one record at a time
//! 2. **Mapping** -- Translate each subtree into typed field values with
//!    element-specific rules (dates, authors, abstracts, MeSH terms, identifiers)
//! 3. **Assembly** -- Repair and validate the mapped values into a complete
//!    [`models::Citation`] graph
//! 4. **Storage** -- Create, upsert, delete and select graphs in a SQLite store,
//!    or dump them into per-table files for bulk loading
//! 5. **Writing** -- Serialize stored graphs as MEDLINE, TSV, TIAB or HTML
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming XML reader yielding raw citation subtrees
//! - [`mapper`] -- Element-specific field mapping
//! - [`filter`] -- Version policy for republished citations
//! - [`assemble`] -- Structural repairs and validation
//! - [`stream`] -- Multi-source ingestion with gzip detection
//! - [`dump`] -- Tab-delimited per-table bulk files
//! - [`store`] -- SQLite schema and primitive graph operations
//! - [`crud`] -- Transactional create/upsert/delete/select
//! - [`writers`] -- MEDLINE, TSV, TIAB and HTML serializers
//! - [`fetch`] -- NCBI eUtils client for online records
//! - [`stats`] -- Ingestion counters
//! - [`config`] -- Constants and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Load a baseline file, then apply an update file
//! medic insert pubmed24n0001.xml.gz
//! medic update pubmed24n1220.xml.gz
//!
//! # Fetch two citations online and print them as MEDLINE
//! medic insert 20029614 11748933
//! medic write 20029614 11748933
//!
//! # Dump a file into per-table files for bulk loading
//! medic dump pubmed24n0001.xml.gz --output-dir dump/
//! ```

pub mod assemble;
pub mod config;
pub mod crud;
pub mod dump;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod mapper;
pub mod models;
pub mod parser;
pub mod stats;
pub mod store;
pub mod stream;
pub mod writers;

pub use error::{Error, Result};
