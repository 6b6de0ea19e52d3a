use super::tsv::preferred_abstract;
use super::CitationWriter;
use crate::error::{Error, Result};
use crate::models::Citation;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

enum Target<W: Write> {
    /// One `<pmid>.txt` file per citation
    Directory(PathBuf),
    /// Records one after another, separated by a blank line
    Stream { out: W, written: u64 },
}

/// Title-and-abstract plain text.
pub struct TiabWriter<W: Write> {
    target: Target<W>,
}

impl TiabWriter<std::io::Sink> {
    pub fn directory(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| Error::File {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            target: Target::Directory(dir),
        })
    }
}

impl<W: Write> TiabWriter<W> {
    pub fn stream(out: W) -> Self {
        Self {
            target: Target::Stream { out, written: 0 },
        }
    }
}

fn render<O: Write>(out: &mut O, citation: &Citation) -> std::io::Result<()> {
    writeln!(out, "{}", citation.title)?;
    if let Some(a) = preferred_abstract(citation) {
        for section in &a.sections {
            writeln!(out)?;
            if let Some(label) = &section.label {
                writeln!(out, "{label}")?;
            }
            writeln!(out, "{}", section.content)?;
        }
    }
    Ok(())
}

impl<W: Write> CitationWriter for TiabWriter<W> {
    fn write(&mut self, citation: &Citation) -> Result<()> {
        match &mut self.target {
            Target::Directory(dir) => {
                let path = dir.join(format!("{}.txt", citation.pmid));
                let file = File::create(&path).map_err(|source| Error::File {
                    path: path.clone(),
                    source,
                })?;
                let mut out = BufWriter::new(file);
                render(&mut out, citation)
                    .and_then(|_| out.flush())
                    .map_err(|source| Error::File { path, source })?;
            }
            Target::Stream { out, written } => {
                if *written > 0 {
                    writeln!(out)?;
                }
                render(out, citation)?;
                *written += 1;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Target::Stream { out, .. } = &mut self.target {
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Abstract, Section};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn citation(pmid: u32) -> Citation {
        Citation {
            pmid,
            status: "MEDLINE".to_string(),
            title: format!("Title {pmid}."),
            journal: "J".to_string(),
            pub_date: "2000".to_string(),
            year: 2000,
            issue: None,
            pagination: None,
            created: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            completed: None,
            revised: None,
            modified: None,
            abstracts: vec![Abstract {
                source: "NLM".to_string(),
                copyright: None,
                sections: vec![
                    Section {
                        seq: 1,
                        name: "Background".to_string(),
                        label: Some("BACKGROUND".to_string()),
                        content: "Why.".to_string(),
                        truncated: false,
                    },
                    Section {
                        seq: 2,
                        name: "Abstract".to_string(),
                        label: None,
                        content: "What.".to_string(),
                        truncated: false,
                    },
                ],
            }],
            authors: Vec::new(),
            publication_types: Vec::new(),
            descriptors: Vec::new(),
            identifiers: Vec::new(),
            databases: Vec::new(),
            chemicals: Vec::new(),
            keywords: Vec::new(),
        }
    }

    #[test]
    fn one_file_per_citation() {
        let dir = TempDir::new().unwrap();
        let mut writer = TiabWriter::directory(dir.path().join("tiab")).unwrap();
        writer.write(&citation(1)).unwrap();
        writer.write(&citation(2)).unwrap();
        writer.finish().unwrap();

        let text = fs::read_to_string(dir.path().join("tiab").join("1.txt")).unwrap();
        assert_eq!(text, "Title 1.\n\nBACKGROUND\nWhy.\n\nWhat.\n");
        assert!(dir.path().join("tiab").join("2.txt").exists());
    }

    #[test]
    fn stream_separates_records() {
        let mut writer = TiabWriter::stream(Vec::new());
        let mut c = citation(2);
        c.abstracts.clear();
        writer.write(&citation(1)).unwrap();
        writer.write(&c).unwrap();
        writer.finish().unwrap();
        let Target::Stream { out, .. } = writer.target else {
            panic!("expected a stream target");
        };
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Title 1.\n\nBACKGROUND\nWhy.\n\nWhat.\n\nTitle 2.\n"
        );
    }
}
