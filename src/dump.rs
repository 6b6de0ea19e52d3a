//! Per-table tab-separated dump files for bulk loading.
//!
//! Files are opened in append mode so several runs can feed the same
//! directory. Absent values are written as `\N`, booleans as `T`/`F`.

use crate::config::{DUMP_BUFFER_SIZE, PROGRESS_INTERVAL};
use crate::error::{Error, Result};
use crate::filter::VersionPolicy;
use crate::models::{Citation, Pmid};
use crate::stream::{CitationStream, Source};
use chrono::{Local, NaiveDate};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use indicatif::ProgressBar;
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const NULL: &str = "\\N";

pub const CITATIONS_FILE: &str = "citations.tab";
pub const ABSTRACTS_FILE: &str = "abstracts.tab";
pub const SECTIONS_FILE: &str = "sections.tab";
pub const AUTHORS_FILE: &str = "authors.tab";
pub const DESCRIPTORS_FILE: &str = "descriptors.tab";
pub const QUALIFIERS_FILE: &str = "qualifiers.tab";
pub const IDENTIFIERS_FILE: &str = "identifiers.tab";
pub const DATABASES_FILE: &str = "databases.tab";
pub const PUBLICATION_TYPES_FILE: &str = "publication_types.tab";
pub const CHEMICALS_FILE: &str = "chemicals.tab";
pub const KEYWORDS_FILE: &str = "keywords.tab";
pub const DELETE_FILE: &str = "delete.txt";

type TableWriter = csv::Writer<BufWriter<File>>;

pub struct DumpWriter {
    citations: TableWriter,
    abstracts: TableWriter,
    sections: TableWriter,
    authors: TableWriter,
    descriptors: TableWriter,
    qualifiers: TableWriter,
    identifiers: TableWriter,
    databases: TableWriter,
    publication_types: TableWriter,
    chemicals: TableWriter,
    keywords: TableWriter,
    delete: BufWriter<File>,
    update_all: bool,
    today: NaiveDate,
    count: u64,
}

fn append(dir: &Path, name: &str) -> Result<BufWriter<File>> {
    let path = dir.join(name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| Error::File { path, source })?;
    Ok(BufWriter::with_capacity(DUMP_BUFFER_SIZE, file))
}

fn table(dir: &Path, name: &str) -> Result<TableWriter> {
    Ok(WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(append(dir, name)?))
}

fn csv_error(e: csv::Error) -> Error {
    Error::Io(e.into())
}

fn write_row<const N: usize>(writer: &mut TableWriter, fields: [Cow<'_, str>; N]) -> Result<()> {
    writer
        .write_record(fields.iter().map(|f| f.as_bytes()))
        .map_err(csv_error)
}

/// Free text with newline, carriage return and tab flattened and backslash doubled.
fn text(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    if memchr::memchr3(b'\n', b'\r', b'\t', bytes).is_none() && memchr::memchr(b'\\', bytes).is_none()
    {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\n' | '\r' | '\t' => out.push(' '),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn opt_text(value: Option<&str>) -> Cow<'_, str> {
    value.map_or(Cow::Borrowed(NULL), text)
}

fn int<I: itoa::Integer>(value: I) -> Cow<'static, str> {
    Cow::Owned(itoa::Buffer::new().format(value).to_owned())
}

fn flag(value: bool) -> Cow<'static, str> {
    Cow::Borrowed(if value { "T" } else { "F" })
}

fn date(value: NaiveDate) -> Cow<'static, str> {
    Cow::Owned(value.format("%Y-%m-%d").to_string())
}

fn opt_date(value: Option<NaiveDate>) -> Cow<'static, str> {
    value.map_or(Cow::Borrowed(NULL), date)
}

impl DumpWriter {
    /// Opens (creating if needed) every table file in `dir` for appending.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|source| Error::File {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            citations: table(dir, CITATIONS_FILE)?,
            abstracts: table(dir, ABSTRACTS_FILE)?,
            sections: table(dir, SECTIONS_FILE)?,
            authors: table(dir, AUTHORS_FILE)?,
            descriptors: table(dir, DESCRIPTORS_FILE)?,
            qualifiers: table(dir, QUALIFIERS_FILE)?,
            identifiers: table(dir, IDENTIFIERS_FILE)?,
            databases: table(dir, DATABASES_FILE)?,
            publication_types: table(dir, PUBLICATION_TYPES_FILE)?,
            chemicals: table(dir, CHEMICALS_FILE)?,
            keywords: table(dir, KEYWORDS_FILE)?,
            delete: append(dir, DELETE_FILE)?,
            update_all: false,
            today: Local::now().date_naive(),
            count: 0,
        })
    }

    /// Also list every dumped PMID in the deletion file, so loading the dump
    /// replaces existing rows.
    pub fn update_all(mut self, update_all: bool) -> Self {
        self.update_all = update_all;
        self
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn write(&mut self, c: &Citation) -> Result<()> {
        let pmid = int(c.pmid);

        write_row(
            &mut self.citations,
            [
                pmid.clone(),
                text(&c.status),
                int(c.year),
                text(&c.title),
                text(&c.journal),
                text(&c.pub_date),
                opt_text(c.issue.as_deref()),
                opt_text(c.pagination.as_deref()),
                date(c.created),
                opt_date(c.completed),
                opt_date(c.revised),
                date(c.modified.unwrap_or(self.today)),
            ],
        )?;

        for a in &c.abstracts {
            write_row(
                &mut self.abstracts,
                [pmid.clone(), text(&a.source), opt_text(a.copyright.as_deref())],
            )?;
            for s in &a.sections {
                write_row(
                    &mut self.sections,
                    [
                        pmid.clone(),
                        text(&a.source),
                        int(s.seq),
                        text(&s.name),
                        opt_text(s.label.as_deref()),
                        text(&s.content),
                        flag(s.truncated),
                    ],
                )?;
            }
        }

        for a in &c.authors {
            write_row(
                &mut self.authors,
                [
                    pmid.clone(),
                    int(a.pos),
                    text(&a.name),
                    opt_text(a.initials.as_deref()),
                    opt_text(a.forename.as_deref()),
                    opt_text(a.suffix.as_deref()),
                ],
            )?;
        }

        for d in &c.descriptors {
            write_row(
                &mut self.descriptors,
                [pmid.clone(), int(d.num), flag(d.major), text(&d.name)],
            )?;
            for q in &d.qualifiers {
                write_row(
                    &mut self.qualifiers,
                    [
                        pmid.clone(),
                        int(d.num),
                        int(q.sub),
                        flag(q.major),
                        text(&q.name),
                    ],
                )?;
            }
        }

        for i in &c.identifiers {
            write_row(
                &mut self.identifiers,
                [pmid.clone(), text(&i.namespace), text(&i.value)],
            )?;
        }

        for db in &c.databases {
            write_row(
                &mut self.databases,
                [pmid.clone(), text(&db.name), text(&db.accession)],
            )?;
        }

        for pt in &c.publication_types {
            write_row(
                &mut self.publication_types,
                [pmid.clone(), text(pt)],
            )?;
        }

        for chem in &c.chemicals {
            write_row(
                &mut self.chemicals,
                [
                    pmid.clone(),
                    int(chem.idx),
                    opt_text(chem.uid.as_deref()),
                    text(&chem.name),
                ],
            )?;
        }

        for k in &c.keywords {
            write_row(
                &mut self.keywords,
                [
                    pmid.clone(),
                    text(&k.owner),
                    int(k.cnt),
                    flag(k.major),
                    text(&k.name),
                ],
            )?;
        }

        if self.update_all {
            writeln!(self.delete, "{}", c.pmid)?;
        }
        self.count += 1;
        Ok(())
    }

    pub fn write_deletions(&mut self, pmids: &[Pmid]) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        for &pmid in pmids {
            self.delete.write_all(buf.format(pmid).as_bytes())?;
            self.delete.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flushes every table file.
    pub fn finish(mut self) -> Result<()> {
        for writer in [
            &mut self.citations,
            &mut self.abstracts,
            &mut self.sections,
            &mut self.authors,
            &mut self.descriptors,
            &mut self.qualifiers,
            &mut self.identifiers,
            &mut self.databases,
            &mut self.publication_types,
            &mut self.chemicals,
            &mut self.keywords,
        ] {
            writer.flush()?;
        }
        self.delete.flush()?;
        Ok(())
    }
}

/// Streams every citation from `sources` into dump files under `dir`, then
/// appends the deletion markers found along the way. Returns the number of
/// citations written.
pub fn dump_files(
    sources: Vec<Source>,
    policy: VersionPolicy,
    dir: &Path,
    update_all: bool,
) -> Result<u64> {
    let mut writer = DumpWriter::open(dir)?.update_all(update_all);
    let mut stream = CitationStream::new(sources, policy);
    let pb = ProgressBar::new_spinner();

    for citation in stream.by_ref() {
        writer.write(&citation?)?;
        if writer.count() % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("{} citations", writer.count()));
            pb.tick();
        }
    }
    pb.finish_and_clear();

    writer.write_deletions(stream.deletions())?;
    let count = writer.count();
    info!(
        citations = count,
        deletions = stream.deletions().len(),
        skipped = stream.stats().skipped(),
        invalid = stream.stats().invalid(),
        "Dump complete"
    );
    writer.finish()?;
    Ok(count)
}

/// All dump file paths in `dir`, in table order followed by the deletion list.
pub fn dump_paths(dir: &Path) -> Vec<PathBuf> {
    [
        CITATIONS_FILE,
        ABSTRACTS_FILE,
        SECTIONS_FILE,
        AUTHORS_FILE,
        DESCRIPTORS_FILE,
        QUALIFIERS_FILE,
        IDENTIFIERS_FILE,
        DATABASES_FILE,
        PUBLICATION_TYPES_FILE,
        CHEMICALS_FILE,
        KEYWORDS_FILE,
        DELETE_FILE,
    ]
    .iter()
    .map(|name| dir.join(name))
    .collect()
}
