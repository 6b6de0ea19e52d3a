use super::CitationWriter;
use crate::error::Result;
use crate::models::Citation;
use std::io::Write;
use tracing::{debug, warn};

const PUBMED_LINK: &str = "https://pubmed.ncbi.nlm.nih.gov/";
const DOI_LINK: &str = "https://doi.org/";
const PMC_LINK: &str = "https://www.ncbi.nlm.nih.gov/pmc/articles/";

const HEADER: &str = r#"<!doctype html>
<html><head>
  <meta charset="UTF-8"/>
  <title>PubMed Articles</title>
  <script>
function toggle(e) {
    e.style.display = (e.style.display == 'none') ? 'block' : 'none'
}
function toggleAll(items) {
    for (var i = 0; i < items.length; i++) {
        toggle(items.item(i))
    }
}
function toggleVisibility(pmid, target) {
    var metadata = document.getElementById(pmid).getElementsByTagName('div').item(0)
    var elements = metadata.childNodes
    for (var i = 0; i < elements.length; i++) {
        var e = elements.item(i)
        if (typeof(e.getAttribute) != 'undefined' && e.getAttribute("class") == target) {
            toggle(e)
        }
    }
}
  </script>
</head><body>
"#;

const FOOTER: &str = r#"  <script>
window.onload = function() {
    toggleAll(document.getElementsByTagName("ul"))
    toggleAll(document.getElementsByTagName("dl"))
}
  </script>
</body></html>
"#;

/// Base URL for accession numbers of a DataBank name.
fn databank_link(name: &str) -> Option<&'static str> {
    match name {
        "GENBANK" => Some("https://www.ncbi.nlm.nih.gov/nuccore/"),
        "RefSeq" => Some("https://www.ncbi.nlm.nih.gov/nuccore/"),
        "OMIM" => Some("https://omim.org/entry/"),
        "PDB" => Some("https://www.rcsb.org/structure/"),
        "SWISSPROT" => Some("https://www.uniprot.org/uniprot/"),
        "PubChem-Substance" => Some("https://pubchem.ncbi.nlm.nih.gov/substance/"),
        "PubChem-Compound" => Some("https://pubchem.ncbi.nlm.nih.gov/compound/"),
        "PubChem-BioAssay" => Some("https://pubchem.ncbi.nlm.nih.gov/bioassay/"),
        "ClinicalTrials.gov" => Some("https://clinicaltrials.gov/study/"),
        "ISRCTN" => Some("https://www.isrctn.com/"),
        "GEO" => Some("https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc="),
        "GDB" | "PIR" => Some("#"),
        _ => None,
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn major(name: &str, major: bool) -> String {
    if major {
        format!("<b>{}</b>", html_escape(name))
    } else {
        html_escape(name)
    }
}

fn button(pmid: u32, target: &str, title: &str) -> String {
    format!(r#"<button onclick="toggleVisibility({pmid}, '{target}')">{title}</button>"#)
}

/// A single HTML page listing every written citation.
pub struct HtmlWriter<W: Write> {
    out: W,
    started: bool,
}

impl<W: Write> HtmlWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            started: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.out.write_all(HEADER.as_bytes())?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: Write> CitationWriter for HtmlWriter<W> {
    fn write(&mut self, c: &Citation) -> Result<()> {
        self.start()?;
        debug!(pmid = c.pmid, "Writing citation as HTML");
        let out = &mut self.out;
        let citation = html_escape(&format!("{}, {}", c.journal, c.citation()));
        let publication_types = html_escape(&c.publication_types.join(", "));

        writeln!(out, "<article id={}>", c.pmid)?;
        let link = c
            .identifier("doi")
            .map(|doi| format!("{DOI_LINK}{doi}"))
            .or_else(|| c.identifier("pmc").map(|pmc| format!("{PMC_LINK}{pmc}")));
        match link {
            Some(href) => writeln!(
                out,
                r#"<p class="citation"><small><a href="{}">{}</a> ({}, PMID:{})</small></p>"#,
                html_escape(&href),
                citation,
                publication_types,
                c.pmid
            )?,
            None => writeln!(
                out,
                r#"<p class="citation"><small>{} ({}, PMID:{})</small></p>"#,
                citation, publication_types, c.pmid
            )?,
        }

        writeln!(
            out,
            "  <h1><a href=\"{}{}\">{}</a></h1>\n  <ol>",
            PUBMED_LINK,
            c.pmid,
            html_escape(&c.title)
        )?;
        for author in &c.authors {
            writeln!(out, "    <li>{}</li>", html_escape(&author.full_name()))?;
        }
        writeln!(out, "  </ol>")?;

        for a in &c.abstracts {
            writeln!(out, "  <h3>{} Abstract</h3>", html_escape(&a.source))?;
            for s in &a.sections {
                let label = s
                    .label
                    .as_deref()
                    .map(|l| format!("{}<br/>", html_escape(&l.to_uppercase())))
                    .unwrap_or_default();
                writeln!(
                    out,
                    "  <p title=\"{}\">{}{}</p>",
                    html_escape(&s.name),
                    label,
                    html_escape(&s.content)
                )?;
            }
            if let Some(copyright) = &a.copyright {
                writeln!(
                    out,
                    "  <p title=\"Copyright\"><small>{}</small></p>",
                    html_escape(copyright)
                )?;
            }
        }

        writeln!(out, "  <div title=\"Metadata\">")?;
        for (present, target, title) in [
            (!c.descriptors.is_empty(), "mesh", "MeSH Terms"),
            (!c.keywords.is_empty(), "kwds", "Keywords"),
            (!c.chemicals.is_empty(), "chem", "Chemicals"),
            (!c.databases.is_empty(), "xref", "DB Links"),
            (!c.identifiers.is_empty(), "ids", "Article IDs"),
        ] {
            if present {
                writeln!(out, "    {}", button(c.pmid, target, title))?;
            }
        }

        if !c.descriptors.is_empty() {
            writeln!(out, "    <dl class=\"mesh\">")?;
            for d in &c.descriptors {
                writeln!(out, "      <dt>{}</dt><dd><ol>", major(&d.name, d.major))?;
                for q in &d.qualifiers {
                    writeln!(out, "        <li>{}</li>", major(&q.name, q.major))?;
                }
                writeln!(out, "      </ol></dd>")?;
            }
            writeln!(out, "    </dl>")?;
        }

        if !c.chemicals.is_empty() {
            writeln!(out, "    <ul class=\"chem\">")?;
            for chem in &c.chemicals {
                let uid = chem
                    .uid
                    .as_deref()
                    .map(|uid| format!(" ({})", html_escape(uid)))
                    .unwrap_or_default();
                writeln!(out, "      <li>{}{}</li>", html_escape(&chem.name), uid)?;
            }
            writeln!(out, "    </ul>")?;
        }

        if !c.keywords.is_empty() {
            writeln!(out, "    <dl class=\"kwds\">")?;
            let mut owner: Option<&str> = None;
            for k in &c.keywords {
                if owner != Some(k.owner.as_str()) {
                    if owner.is_some() {
                        writeln!(out, "      </dd>")?;
                    }
                    writeln!(out, "      <dt>{}</dt><dd>", html_escape(&k.owner))?;
                    owner = Some(k.owner.as_str());
                }
                writeln!(out, "      <li>{}</li>", major(&k.name, k.major))?;
            }
            writeln!(out, "    </dd></dl>")?;
        }

        if !c.databases.is_empty() {
            writeln!(out, "    <ul class=\"xref\">")?;
            for db in &c.databases {
                let accession = html_escape(&db.accession);
                match databank_link(&db.name) {
                    Some(base) => writeln!(
                        out,
                        "      <li>{} <a href=\"{}{}\">{}</a></li>",
                        html_escape(&db.name),
                        base,
                        accession,
                        accession
                    )?,
                    None => {
                        warn!(pmid = c.pmid, name = %db.name, "Unknown DataBank name");
                        writeln!(out, "      <li>{} {}</li>", html_escape(&db.name), accession)?
                    }
                }
            }
            writeln!(out, "    </ul>")?;
        }

        if !c.identifiers.is_empty() {
            writeln!(out, "    <ul class=\"ids\">")?;
            for i in &c.identifiers {
                let value = html_escape(&i.value);
                match i.namespace.as_str() {
                    "doi" => writeln!(out, "      <li><a href=\"{DOI_LINK}{value}\">{value}</a></li>")?,
                    "pmc" => writeln!(out, "      <li><a href=\"{PMC_LINK}{value}\">{value}</a></li>")?,
                    ns => writeln!(out, "      <li>{}:{}</li>", html_escape(ns), value)?,
                }
            }
            writeln!(out, "    </ul>")?;
        }

        writeln!(out, "  </div>\n</article><hr/>")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.start()?;
        self.out.write_all(FOOTER.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, Descriptor, Identifier, Keyword};
    use chrono::NaiveDate;

    fn citation() -> Citation {
        Citation {
            pmid: 321,
            status: "MEDLINE".to_string(),
            title: "Cats & <dogs>".to_string(),
            journal: "J Pets".to_string(),
            pub_date: "2005 May".to_string(),
            year: 2005,
            issue: Some("4(1)".to_string()),
            pagination: Some("1-2".to_string()),
            created: NaiveDate::from_ymd_opt(2005, 5, 1).unwrap(),
            completed: None,
            revised: None,
            modified: None,
            abstracts: Vec::new(),
            authors: vec![Author {
                pos: 1,
                name: "Smith".to_string(),
                initials: Some("J".to_string()),
                forename: Some("John".to_string()),
                suffix: None,
            }],
            publication_types: vec!["JOURNAL ARTICLE".to_string()],
            descriptors: vec![Descriptor {
                num: 1,
                name: "Cats".to_string(),
                major: true,
                qualifiers: Vec::new(),
            }],
            identifiers: vec![Identifier {
                namespace: "doi".to_string(),
                value: "10.1/pets".to_string(),
            }],
            databases: Vec::new(),
            chemicals: Vec::new(),
            keywords: vec![Keyword {
                owner: "NOTNLM".to_string(),
                cnt: 1,
                name: "pets".to_string(),
                major: false,
            }],
        }
    }

    fn render(citations: &[Citation]) -> String {
        let mut writer = HtmlWriter::new(Vec::new());
        for c in citations {
            writer.write(c).unwrap();
        }
        writer.finish().unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn escapes_and_links() {
        let html = render(&[citation()]);
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.trim_end().ends_with("</body></html>"));
        assert!(html.contains("Cats &amp; &lt;dogs&gt;"));
        assert!(html.contains(r#"<a href="https://doi.org/10.1/pets">J Pets, 2005 May; 4(1): 1-2</a> (JOURNAL ARTICLE, PMID:321)"#));
        assert!(html.contains("<li>John Smith</li>"));
        assert!(html.contains("<dt><b>Cats</b></dt>"));
        assert!(html.contains("<dt>NOTNLM</dt><dd>"));
        assert!(html.contains("toggleVisibility(321, 'mesh')"));
    }

    #[test]
    fn empty_document_is_still_complete() {
        let html = render(&[]);
        assert!(html.contains("<body>"));
        assert!(html.contains("</body></html>"));
        assert!(!html.contains("<article"));
    }

    #[test]
    fn escape_all_specials() {
        assert_eq!(html_escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
