use super::CitationWriter;
use crate::config::NLM_SOURCE;
use crate::error::Result;
use crate::models::{Abstract, Citation};
use std::io::Write;

/// One `pmid \t title \t abstract` line per citation.
pub struct TsvWriter<W: Write> {
    out: W,
}

impl<W: Write> TsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// The NLM abstract, else the only abstract there is.
pub fn preferred_abstract(citation: &Citation) -> Option<&Abstract> {
    citation
        .abstract_for(NLM_SOURCE)
        .or_else(|| match citation.abstracts.as_slice() {
            [only] => Some(only),
            _ => None,
        })
}

/// Collapses tabs and line breaks so the value stays in one column.
fn flatten(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

impl<W: Write> CitationWriter for TsvWriter<W> {
    fn write(&mut self, citation: &Citation) -> Result<()> {
        let abstract_text = preferred_abstract(citation)
            .map(Abstract::text)
            .unwrap_or_default();
        writeln!(
            self.out,
            "{}\t{}\t{}",
            citation.pmid,
            flatten(&citation.title),
            flatten(&abstract_text)
        )?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;
    use chrono::NaiveDate;

    fn citation(abstracts: Vec<Abstract>) -> Citation {
        Citation {
            pmid: 5,
            status: "MEDLINE".to_string(),
            title: "Title\twith tab".to_string(),
            journal: "J".to_string(),
            pub_date: "2000".to_string(),
            year: 2000,
            issue: None,
            pagination: None,
            created: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            completed: None,
            revised: None,
            modified: None,
            abstracts,
            authors: Vec::new(),
            publication_types: Vec::new(),
            descriptors: Vec::new(),
            identifiers: Vec::new(),
            databases: Vec::new(),
            chemicals: Vec::new(),
            keywords: Vec::new(),
        }
    }

    fn abstract_(source: &str, contents: &[&str]) -> Abstract {
        Abstract {
            source: source.to_string(),
            copyright: None,
            sections: contents
                .iter()
                .enumerate()
                .map(|(i, content)| Section {
                    seq: i as u16 + 1,
                    name: "Abstract".to_string(),
                    label: None,
                    content: content.to_string(),
                    truncated: false,
                })
                .collect(),
        }
    }

    fn tsv(c: &Citation) -> String {
        let mut writer = TsvWriter::new(Vec::new());
        writer.write(c).unwrap();
        writer.finish().unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn embedded_newlines_stay_on_one_line() {
        let c = citation(vec![abstract_("NLM", &["Line one.\nLine two.\nLine three."])]);
        let out = tsv(&c);
        assert_eq!(out.lines().count(), 1);
        assert_eq!(out, "5\tTitle with tab\tLine one. Line two. Line three.\n");
    }

    #[test]
    fn prefers_nlm_abstract_and_joins_sections() {
        let c = citation(vec![
            abstract_("KIE", &["Other."]),
            abstract_("NLM", &["First.", "Second."]),
        ]);
        assert_eq!(tsv(&c), "5\tTitle with tab\tFirst. Second.\n");
    }

    #[test]
    fn sole_other_abstract_or_nothing() {
        let c = citation(vec![abstract_("KIE", &["Other."])]);
        assert_eq!(tsv(&c), "5\tTitle with tab\tOther.\n");

        let c = citation(vec![abstract_("KIE", &["A."]), abstract_("PIP", &["B."])]);
        assert_eq!(tsv(&c), "5\tTitle with tab\t\n");

        let c = citation(Vec::new());
        assert_eq!(tsv(&c), "5\tTitle with tab\t\n");
    }
}
