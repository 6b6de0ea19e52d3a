//! Serializers over hydrated citation graphs.

pub mod html;
pub mod native;
pub mod tiab;
pub mod tsv;

use crate::error::Result;
use crate::models::Citation;
use std::io::Write;

pub use html::HtmlWriter;
pub use native::{NativeReader, NativeWriter};
pub use tiab::TiabWriter;
pub use tsv::TsvWriter;

pub trait CitationWriter {
    fn write(&mut self, citation: &Citation) -> Result<()>;

    /// Writes any trailer and flushes the output.
    fn finish(&mut self) -> Result<()>;
}

/// Output formats of the `write` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// MEDLINE flat file
    #[default]
    Medline,
    /// pmid, title and abstract per line
    Tsv,
    /// title and abstract plain text
    Tiab,
    /// a single HTML page
    Html,
}

/// A stream writer for `format` on top of `out`.
pub fn stream_writer<'a, W: Write + 'a>(format: Format, out: W) -> Box<dyn CitationWriter + 'a> {
    match format {
        Format::Medline => Box::new(NativeWriter::new(out)),
        Format::Tsv => Box::new(TsvWriter::new(out)),
        Format::Tiab => Box::new(TiabWriter::stream(out)),
        Format::Html => Box::new(HtmlWriter::new(out)),
    }
}
