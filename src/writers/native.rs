//! MEDLINE flat-file format: one labeled stanza per citation.
//!
//! Every line is a four-character label, `- ` and the value. Backslashes,
//! newlines and carriage returns inside values are escaped so each value stays
//! on one line, which lets [`NativeReader`] restore the exact graph.

use super::CitationWriter;
use crate::assemble::assemble;
use crate::config::{NLM_SOURCE, PMC_NAMESPACE};
use crate::error::{Error, Result};
use crate::mapper::MappedCitation;
use crate::models::{
    Abstract, Author, Chemical, Citation, Database, Descriptor, Identifier, Keyword, Pmid,
    Qualifier, Section,
};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::io::{BufRead, Write};
use tracing::debug;

const DATE_FORMAT: &str = "%Y%m%d";

/// Registry number MEDLINE prints for substances without one
const NO_REGISTRY_NUMBER: &str = "0";

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\n', '\r']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(value: &str) -> Cow<'_, str> {
    if !value.contains('\\') {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

pub struct NativeWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> NativeWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, label: &str, value: &str) -> Result<()> {
        writeln!(self.out, "{:<4}- {}", label, escape(value))?;
        Ok(())
    }

    fn date_line(&mut self, label: &str, date: Option<NaiveDate>) -> Result<()> {
        if let Some(date) = date {
            self.line(label, &date.format(DATE_FORMAT).to_string())?;
        }
        Ok(())
    }

    fn author(&mut self, author: &Author) -> Result<()> {
        if author.is_corporate() {
            return self.line("CN", &author.name);
        }
        self.line("AU", &author.short_name())?;
        let mut full = author.name.clone();
        match (author.forename.as_deref(), author.suffix.as_deref()) {
            (Some(f), Some(s)) => full.push_str(&format!(", {f}, {s}")),
            (None, Some(s)) => full.push_str(&format!(", , {s}")),
            (Some(f), None) => full.push_str(&format!(", {f}")),
            (None, None) => {}
        }
        self.line("FAU", &full)
    }
}

fn major(name: &str, major: bool) -> String {
    if major {
        format!("*{name}")
    } else {
        name.to_string()
    }
}

impl<W: Write> CitationWriter for NativeWriter<W> {
    fn write(&mut self, c: &Citation) -> Result<()> {
        if self.written > 0 {
            writeln!(self.out)?;
        }
        self.line("PMID", &c.pmid.to_string())?;
        self.line("STAT", &c.status)?;
        self.date_line("DA", Some(c.created))?;
        self.date_line("DCOM", c.completed)?;
        self.date_line("LR", c.revised)?;
        self.date_line("DM", c.modified)?;
        self.line("TA", &c.journal)?;
        self.line("DP", &c.pub_date)?;
        if let Some(issue) = &c.issue {
            self.line("VI", issue)?;
        }
        if let Some(pagination) = &c.pagination {
            self.line("PG", pagination)?;
        }
        self.line("SO", &format!("{}. {}.", c.journal, c.citation()))?;
        for pt in &c.publication_types {
            self.line("PT", pt)?;
        }
        self.line("TI", &c.title)?;

        for author in &c.authors {
            self.author(author)?;
        }

        for a in &c.abstracts {
            self.line("AS", &a.source)?;
            for s in &a.sections {
                self.line("SN", &s.name)?;
                if let Some(label) = &s.label {
                    self.line("SL", label)?;
                }
                self.line("AB", &s.content)?;
                if s.truncated {
                    self.line("TR", "Y")?;
                }
            }
            if let Some(copyright) = &a.copyright {
                self.line("CI", &format!("{}: {}", a.source, copyright))?;
            }
        }

        for d in &c.descriptors {
            let mut heading = major(&d.name, d.major);
            for q in &d.qualifiers {
                heading.push('/');
                heading.push_str(&major(&q.name, q.major));
            }
            self.line("MH", &heading)?;
        }

        let mut owner: Option<&str> = None;
        for k in &c.keywords {
            if owner != Some(k.owner.as_str()) {
                self.line("OTO", &k.owner)?;
                owner = Some(k.owner.as_str());
            }
            self.line("OT", &major(&k.name, k.major))?;
        }

        for chem in &c.chemicals {
            let uid = chem.uid.as_deref().unwrap_or(NO_REGISTRY_NUMBER);
            self.line("RN", &format!("{} ({})", uid, chem.name))?;
        }

        for db in &c.databases {
            self.line("SI", &format!("{}/{}", db.name, db.accession))?;
        }

        for i in &c.identifiers {
            if i.namespace == PMC_NAMESPACE {
                self.line("PMC", &i.value)?;
            } else {
                self.line("AID", &format!("{} [{}]", i.value, i.namespace))?;
            }
        }

        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads MEDLINE stanzas back into citations.
///
/// Continuation lines (six leading spaces) are joined to the previous value,
/// and labels the model does not carry are ignored.
pub struct NativeReader<R: BufRead> {
    input: R,
    line_no: usize,
    finished: bool,
}

impl<R: BufRead> NativeReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line_no: 0,
            finished: false,
        }
    }

    /// Collects the `(line, label, value)` fields of the next stanza.
    fn next_stanza(&mut self) -> Result<Option<Vec<(usize, String, String)>>> {
        let mut fields: Vec<(usize, String, String)> = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.input.read_line(&mut buf)? == 0 {
                break;
            }
            self.line_no += 1;
            let line = buf.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                if fields.is_empty() {
                    continue;
                }
                break;
            }
            if let Some(rest) = line.strip_prefix("      ") {
                match fields.last_mut() {
                    Some((_, _, value)) => {
                        value.push(' ');
                        value.push_str(rest.trim());
                        continue;
                    }
                    None => {
                        return Err(Error::Native {
                            line: self.line_no,
                            message: "continuation line outside a stanza".to_string(),
                        })
                    }
                }
            }
            let (label, value) = match (line.get(..4), line.get(4..6)) {
                (Some(label), Some("- ")) => (label.trim_end(), &line[6..]),
                _ => match line.get(4..) {
                    Some("-") => (line[..4].trim_end(), ""),
                    _ => {
                        return Err(Error::Native {
                            line: self.line_no,
                            message: format!("not a labeled line: {line:?}"),
                        })
                    }
                },
            };
            fields.push((self.line_no, label.to_string(), value.to_string()));
        }
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }
}

impl<R: BufRead> Iterator for NativeReader<R> {
    type Item = Result<Citation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = match self.next_stanza() {
            Ok(Some(fields)) => parse_stanza(fields).and_then(assemble),
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if matches!(result, Err(Error::Io(_))) {
            self.finished = true;
        }
        Some(result)
    }
}

#[derive(Default)]
struct StanzaBuilder {
    pmid: Option<Pmid>,
    status: Option<String>,
    title: Option<String>,
    journal: Option<String>,
    pub_date: Option<String>,
    issue: Option<String>,
    pagination: Option<String>,
    created: Option<NaiveDate>,
    completed: Option<NaiveDate>,
    revised: Option<NaiveDate>,
    modified: Option<NaiveDate>,
    abstracts: Vec<Abstract>,
    authors: Vec<Author>,
    /// AU value waiting for its FAU line
    pending_author: Option<String>,
    publication_types: Vec<String>,
    descriptors: Vec<Descriptor>,
    identifiers: Vec<Identifier>,
    databases: Vec<Database>,
    chemicals: Vec<Chemical>,
    keywords: Vec<Keyword>,
    keyword_owner: Option<String>,
}

fn native_error(line: usize, message: impl Into<String>) -> Error {
    Error::Native {
        line,
        message: message.into(),
    }
}

fn parse_native_date(line: usize, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| native_error(line, format!("not a YYYYMMDD date: {value:?}")))
}

fn split_major(value: &str) -> (String, bool) {
    match value.strip_prefix('*') {
        Some(name) => (name.to_string(), true),
        None => (value.to_string(), false),
    }
}

impl StanzaBuilder {
    fn push_author(&mut self, mut author: Author) {
        author.pos = self.authors.len() as u16 + 1;
        self.authors.push(author);
    }

    /// An AU line that never got its FAU: split "Name INITIALS" at the last space.
    fn flush_pending_author(&mut self) {
        if let Some(short) = self.pending_author.take() {
            let (name, initials) = match short.rsplit_once(' ') {
                Some((name, initials)) => (name.to_string(), Some(initials.to_string())),
                None => (short, None),
            };
            self.push_author(Author {
                pos: 0,
                name,
                initials,
                forename: None,
                suffix: None,
            });
        }
    }

    fn current_abstract(&mut self) -> &mut Abstract {
        if self.abstracts.is_empty() {
            self.abstracts.push(Abstract {
                source: NLM_SOURCE.to_string(),
                copyright: None,
                sections: Vec::new(),
            });
        }
        let last = self.abstracts.len() - 1;
        &mut self.abstracts[last]
    }

    fn current_section(&mut self, line: usize, label: &str) -> Result<&mut Section> {
        self.current_abstract()
            .sections
            .last_mut()
            .ok_or_else(|| native_error(line, format!("{label} before any SN/AB line")))
    }

    fn field(&mut self, line: usize, label: &str, raw: &str) -> Result<()> {
        let value = unescape(raw);
        let value = value.as_ref();
        if label != "FAU" {
            self.flush_pending_author();
        }
        match label {
            "PMID" => {
                let pmid = value
                    .trim()
                    .parse::<Pmid>()
                    .map_err(|_| native_error(line, format!("not a PMID: {value:?}")))?;
                self.pmid = Some(pmid);
            }
            "STAT" => self.status = Some(value.to_string()),
            "DA" => self.created = Some(parse_native_date(line, value)?),
            "DCOM" => self.completed = Some(parse_native_date(line, value)?),
            "LR" => self.revised = Some(parse_native_date(line, value)?),
            "DM" => self.modified = Some(parse_native_date(line, value)?),
            "TA" => self.journal = Some(value.to_string()),
            "DP" => self.pub_date = Some(value.to_string()),
            "VI" => self.issue = Some(value.to_string()),
            "PG" => self.pagination = Some(value.to_string()),
            "PT" => self.publication_types.push(value.to_string()),
            "TI" => self.title = Some(value.to_string()),
            "CN" => self.push_author(Author {
                pos: 0,
                name: value.to_string(),
                initials: Some(String::new()),
                forename: Some(String::new()),
                suffix: Some(String::new()),
            }),
            "AU" => self.pending_author = Some(value.to_string()),
            "FAU" => {
                let short = self.pending_author.take();
                let mut parts = value.splitn(3, ", ");
                let name = parts.next().unwrap_or_default().to_string();
                let forename = parts.next().filter(|f| !f.is_empty()).map(String::from);
                let suffix = parts.next().filter(|s| !s.is_empty()).map(String::from);
                let initials = short.and_then(|s| {
                    s.strip_prefix(name.as_str())
                        .map(str::trim)
                        .filter(|i| !i.is_empty())
                        .map(String::from)
                });
                self.push_author(Author {
                    pos: 0,
                    name,
                    initials,
                    forename,
                    suffix,
                });
            }
            "AS" => self.abstracts.push(Abstract {
                source: value.to_string(),
                copyright: None,
                sections: Vec::new(),
            }),
            "SN" => self.current_abstract().sections.push(Section {
                seq: 0,
                name: value.to_string(),
                label: None,
                content: String::new(),
                truncated: false,
            }),
            "SL" => self.current_section(line, label)?.label = Some(value.to_string()),
            "AB" => {
                let sections = &mut self.current_abstract().sections;
                match sections.last_mut() {
                    Some(s) if s.content.is_empty() => s.content = value.to_string(),
                    _ => sections.push(Section {
                        seq: 0,
                        name: "Abstract".to_string(),
                        label: None,
                        content: value.to_string(),
                        truncated: false,
                    }),
                }
            }
            "TR" => self.current_section(line, label)?.truncated = value.trim() == "Y",
            "CI" => {
                let current = self.current_abstract();
                let prefix = format!("{}: ", current.source);
                let copyright = value.strip_prefix(prefix.as_str()).unwrap_or(value);
                current.copyright = Some(copyright.to_string());
            }
            "MH" => {
                let mut parts = value.split('/');
                let (name, major) = split_major(parts.next().unwrap_or_default());
                let qualifiers = parts
                    .enumerate()
                    .map(|(sub, q)| {
                        let (name, major) = split_major(q);
                        Qualifier {
                            sub: sub as u16 + 1,
                            name,
                            major,
                        }
                    })
                    .collect();
                self.descriptors.push(Descriptor {
                    num: self.descriptors.len() as u16 + 1,
                    name,
                    major,
                    qualifiers,
                });
            }
            "OTO" => self.keyword_owner = Some(value.to_string()),
            "OT" => {
                let (name, major) = split_major(value);
                self.keywords.push(Keyword {
                    owner: self
                        .keyword_owner
                        .clone()
                        .unwrap_or_else(|| NLM_SOURCE.to_string()),
                    cnt: 0,
                    name,
                    major,
                });
            }
            "RN" => {
                // registry numbers may hold spaces ("EC 3.4.21.5") but never " ("
                let (uid, name) = match value.split_once(" (") {
                    Some((uid, rest)) if !uid.is_empty() && rest.ends_with(')') => {
                        (uid, &rest[..rest.len() - 1])
                    }
                    _ => (NO_REGISTRY_NUMBER, value),
                };
                self.chemicals.push(Chemical {
                    idx: self.chemicals.len() as u16 + 1,
                    uid: Some(uid.to_string()).filter(|u| u != NO_REGISTRY_NUMBER),
                    name: name.to_string(),
                });
            }
            "SI" => match value.split_once('/') {
                Some((name, accession)) => self.databases.push(Database {
                    name: name.to_string(),
                    accession: accession.to_string(),
                }),
                None => return Err(native_error(line, format!("SI without '/': {value:?}"))),
            },
            "PMC" => self.identifiers.push(Identifier {
                namespace: PMC_NAMESPACE.to_string(),
                value: value.to_string(),
            }),
            "AID" => match value.rsplit_once(" [") {
                Some((id, ns)) if ns.ends_with(']') => self.identifiers.push(Identifier {
                    namespace: ns[..ns.len() - 1].to_string(),
                    value: id.to_string(),
                }),
                _ => return Err(native_error(line, format!("AID without namespace: {value:?}"))),
            },
            // derived from the fields above
            "SO" => {}
            other => debug!(label = other, line, "Ignoring MEDLINE field"),
        }
        Ok(())
    }

    fn finish(mut self, first_line: usize) -> Result<MappedCitation> {
        self.flush_pending_author();
        let missing = |label: &str| native_error(first_line, format!("stanza without {label}"));
        Ok(MappedCitation {
            pmid: self.pmid.ok_or_else(|| missing("PMID"))?,
            status: self.status.ok_or_else(|| missing("STAT"))?,
            title: self.title.ok_or_else(|| missing("TI"))?,
            journal: self.journal.ok_or_else(|| missing("TA"))?,
            pub_date: self.pub_date.ok_or_else(|| missing("DP"))?,
            issue: self.issue,
            pagination: self.pagination,
            created: self.created.ok_or_else(|| missing("DA"))?,
            completed: self.completed,
            revised: self.revised,
            modified: self.modified,
            abstracts: self.abstracts,
            authors: self.authors,
            publication_types: self.publication_types,
            descriptors: self.descriptors,
            identifiers: self.identifiers,
            databases: self.databases,
            chemicals: self.chemicals,
            keywords: self.keywords,
        })
    }
}

fn parse_stanza(fields: Vec<(usize, String, String)>) -> Result<MappedCitation> {
    let first_line = fields.first().map_or(0, |(line, _, _)| *line);
    let mut builder = StanzaBuilder::default();
    for (line, label, value) in &fields {
        builder.field(*line, label, value)?;
    }
    builder.finish(first_line)
}
