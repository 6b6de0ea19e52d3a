//! Entity-specific rules that turn one raw citation element into typed fields.
//!
//! The output is deliberately unrepaired: duplicate publication types, blank
//! keywords and unsequenced sections are left for the assembler.

use crate::config::{
    DOI_PATTERN, MAX_FORENAME_CHARS, NLM_SOURCE, PMC_NAMESPACE, PMC_OTHER_ID_SOURCE,
    PUBLISHER_STUB_ABSTRACT, TRUNCATION_PATTERN, UNKNOWN_TITLE,
};
use crate::error::{Error, Result};
use crate::models::{
    Abstract, Author, Chemical, Database, Descriptor, Identifier, Keyword, Pmid, Qualifier,
    Section,
};
use crate::parser::XmlElement;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use tracing::{debug, info, trace, warn};

static TRUNCATION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(TRUNCATION_PATTERN).unwrap());

static DOI_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(DOI_PATTERN).unwrap());

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Typed field values of one citation, before assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCitation {
    pub pmid: Pmid,
    pub status: String,
    pub title: String,
    pub journal: String,
    pub pub_date: String,
    pub issue: Option<String>,
    pub pagination: Option<String>,
    pub created: NaiveDate,
    pub completed: Option<NaiveDate>,
    pub revised: Option<NaiveDate>,
    pub modified: Option<NaiveDate>,
    /// Sections carry `seq == 0` until assembled
    pub abstracts: Vec<Abstract>,
    pub authors: Vec<Author>,
    pub publication_types: Vec<String>,
    pub descriptors: Vec<Descriptor>,
    pub identifiers: Vec<Identifier>,
    pub databases: Vec<Database>,
    pub chemicals: Vec<Chemical>,
    pub keywords: Vec<Keyword>,
}

/// Tags the mapper knows how to handle. Anything else is a plain container
/// whose children are visited in turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Abstract,
    OtherAbstract,
    AuthorList,
    ChemicalList,
    DataBank,
    ELocationID,
    KeywordList,
    MeshHeadingList,
    OtherID,
    PublicationType,
    ArticleId,
    /// Subtrees that quote other citations; never descended into
    Opaque,
    Container,
}

impl ElementKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "Abstract" => ElementKind::Abstract,
            "OtherAbstract" => ElementKind::OtherAbstract,
            "AuthorList" => ElementKind::AuthorList,
            "ChemicalList" => ElementKind::ChemicalList,
            "DataBank" => ElementKind::DataBank,
            "ELocationID" => ElementKind::ELocationID,
            "KeywordList" => ElementKind::KeywordList,
            "MeshHeadingList" => ElementKind::MeshHeadingList,
            "OtherID" => ElementKind::OtherID,
            "PublicationType" => ElementKind::PublicationType,
            "ArticleId" => ElementKind::ArticleId,
            "ReferenceList" | "CommentsCorrectionsList" => ElementKind::Opaque,
            _ => ElementKind::Container,
        }
    }
}

/// Maps a `MedlineCitation` or `PubmedArticle` element.
pub fn map_citation(root: &XmlElement) -> Result<MappedCitation> {
    let (medline, pubmed_data) = if root.name == "PubmedArticle" {
        let medline = root
            .child("MedlineCitation")
            .ok_or_else(|| Error::structural(None, "PubmedArticle without MedlineCitation"))?;
        (medline, root.child("PubmedData"))
    } else {
        (root, None)
    };

    let pmid = medline
        .child("PMID")
        .and_then(XmlElement::trimmed_text)
        .and_then(|t| t.parse::<Pmid>().ok())
        .filter(|&p| p > 0)
        .ok_or_else(|| Error::structural(None, "missing or malformed PMID"))?;
    let status = medline
        .attr("Status")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::structural(Some(pmid), "missing Status"))?
        .to_string();
    let journal = medline
        .find("MedlineJournalInfo/MedlineTA")
        .and_then(XmlElement::trimmed_text)
        .ok_or_else(|| Error::structural(Some(pmid), "missing MedlineTA journal"))?;

    let article = medline.child("Article");
    let title = map_title(pmid, article);
    let pub_date = article
        .and_then(|a| a.find("Journal/JournalIssue/PubDate"))
        .and_then(map_pub_date)
        .ok_or_else(|| Error::structural(Some(pmid), "missing publication date"))?;
    let issue = article
        .and_then(|a| a.find("Journal/JournalIssue"))
        .and_then(map_issue);
    let pagination = article
        .and_then(|a| a.find("Pagination/MedlinePgn"))
        .and_then(XmlElement::trimmed_text);

    let completed = medline
        .child("DateCompleted")
        .and_then(|e| parse_date(pmid, e));
    let revised = medline
        .child("DateRevised")
        .and_then(|e| parse_date(pmid, e));
    let created = match medline
        .child("DateCreated")
        .and_then(|e| parse_date(pmid, e))
    {
        Some(date) => date,
        None => {
            let fallback = completed
                .or(revised)
                .ok_or_else(|| Error::structural(Some(pmid), "no usable record date"))?;
            warn!(pmid, "DateCreated missing; using {}", fallback);
            fallback
        }
    };

    let mut fields = FieldMapper::new(pmid);
    fields.walk(medline);
    if let Some(data) = pubmed_data {
        fields.walk(data);
    }

    Ok(MappedCitation {
        pmid,
        status,
        title,
        journal,
        pub_date,
        issue,
        pagination,
        created,
        completed,
        revised,
        modified: None,
        abstracts: fields.abstracts,
        authors: fields.authors,
        publication_types: fields.publication_types,
        descriptors: fields.descriptors,
        identifiers: fields.identifiers,
        databases: fields.databases,
        chemicals: fields.chemicals,
        keywords: fields.keywords,
    })
}

fn map_title(pmid: Pmid, article: Option<&XmlElement>) -> String {
    let article = match article {
        Some(a) => a,
        None => {
            warn!(pmid, "No Article element; using placeholder title");
            return UNKNOWN_TITLE.to_string();
        }
    };
    if let Some(title) = article.child("ArticleTitle").and_then(XmlElement::trimmed_text) {
        return title;
    }
    if let Some(title) = article
        .child("VernacularTitle")
        .and_then(XmlElement::trimmed_text)
    {
        info!(pmid, "Empty ArticleTitle; using VernacularTitle");
        return title;
    }
    warn!(pmid, "No title found; using placeholder title");
    UNKNOWN_TITLE.to_string()
}

fn map_pub_date(element: &XmlElement) -> Option<String> {
    if let Some(medline_date) = element.child("MedlineDate").and_then(XmlElement::trimmed_text) {
        return Some(medline_date);
    }
    let mut parts = vec![element.child("Year").and_then(XmlElement::trimmed_text)?];
    if let Some(season) = element.child("Season").and_then(XmlElement::trimmed_text) {
        parts.push(season);
    } else if let Some(month) = element.child("Month").and_then(XmlElement::trimmed_text) {
        parts.push(month);
        if let Some(day) = element.child("Day").and_then(XmlElement::trimmed_text) {
            parts.push(day);
        }
    }
    Some(parts.join(" "))
}

fn map_issue(element: &XmlElement) -> Option<String> {
    let volume = element.child("Volume").and_then(XmlElement::trimmed_text);
    let issue = element.child("Issue").and_then(XmlElement::trimmed_text);
    match (volume, issue) {
        (Some(v), Some(i)) => Some(format!("{v}({i})")),
        (Some(v), None) => Some(v),
        (None, Some(i)) => Some(i),
        (None, None) => None,
    }
}

/// Parses a `Year`/`Month`/`Day` date element; month and day default to 1.
pub(crate) fn parse_date(pmid: Pmid, element: &XmlElement) -> Option<NaiveDate> {
    let year = match element
        .child("Year")
        .and_then(XmlElement::trimmed_text)
        .and_then(|y| y.parse::<i32>().ok())
    {
        Some(y) => y,
        None => {
            warn!(pmid, tag = %element.name, "Date without a usable Year");
            return None;
        }
    };
    let month = match element.child("Month").and_then(XmlElement::trimmed_text) {
        Some(text) => parse_month(&text).unwrap_or_else(|| {
            warn!(pmid, month = %text, "Could not parse Month");
            1
        }),
        None => 1,
    };
    let day = match element.child("Day").and_then(XmlElement::trimmed_text) {
        Some(text) => text.parse::<u32>().unwrap_or_else(|_| {
            warn!(pmid, day = %text, "Could not parse Day");
            1
        }),
        None => 1,
    };
    let date = NaiveDate::from_ymd_opt(year, month, day);
    if date.is_none() {
        warn!(pmid, year, month, day, "Invalid calendar date");
    }
    date
}

fn parse_month(text: &str) -> Option<u32> {
    if let Ok(month) = text.parse::<u32>() {
        return Some(month);
    }
    let lower = text.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .map(|idx| idx as u32 + 1)
}

/// Python-style capitalize: first letter upper-case, the rest lower-case.
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn is_major(element: &XmlElement) -> bool {
    element.attr("MajorTopicYN").map(str::trim) == Some("Y")
}

/// Per-citation state while walking the record subtree.
struct FieldMapper {
    pmid: Pmid,
    namespaces: FxHashSet<String>,
    databases_seen: FxHashSet<(String, String)>,
    abstracts: Vec<Abstract>,
    authors: Vec<Author>,
    publication_types: Vec<String>,
    descriptors: Vec<Descriptor>,
    identifiers: Vec<Identifier>,
    databases: Vec<Database>,
    chemicals: Vec<Chemical>,
    keywords: Vec<Keyword>,
}

impl FieldMapper {
    fn new(pmid: Pmid) -> Self {
        Self {
            pmid,
            namespaces: FxHashSet::default(),
            databases_seen: FxHashSet::default(),
            abstracts: Vec::new(),
            authors: Vec::new(),
            publication_types: Vec::new(),
            descriptors: Vec::new(),
            identifiers: Vec::new(),
            databases: Vec::new(),
            chemicals: Vec::new(),
            keywords: Vec::new(),
        }
    }

    fn walk(&mut self, element: &XmlElement) {
        for child in element.children() {
            match ElementKind::from_tag(&child.name) {
                ElementKind::Abstract => self.map_abstract(child, NLM_SOURCE),
                ElementKind::OtherAbstract => self.map_other_abstract(child),
                ElementKind::AuthorList => self.map_authors(child),
                ElementKind::ChemicalList => self.map_chemicals(child),
                ElementKind::DataBank => self.map_databank(child),
                ElementKind::ELocationID => self.map_elocation(child),
                ElementKind::KeywordList => self.map_keywords(child),
                ElementKind::MeshHeadingList => self.map_mesh(child),
                ElementKind::OtherID => self.map_other_id(child),
                ElementKind::PublicationType => self.map_publication_type(child),
                ElementKind::ArticleId => self.map_article_id(child),
                ElementKind::Opaque => trace!(pmid = self.pmid, tag = %child.name, "Skipping subtree"),
                ElementKind::Container => self.walk(child),
            }
        }
    }

    fn map_abstract(&mut self, element: &XmlElement, source: &str) {
        if self.abstracts.iter().any(|a| a.source == source) {
            warn!(pmid = self.pmid, source, "Repeated abstract source; ignoring");
            return;
        }
        let copyright = element
            .child("CopyrightInformation")
            .and_then(XmlElement::trimmed_text);
        let sections = element
            .children_named("AbstractText")
            .filter_map(|text| self.map_section(text))
            .collect();
        self.abstracts.push(Abstract {
            source: source.to_string(),
            copyright,
            sections,
        });
    }

    fn map_section(&self, element: &XmlElement) -> Option<Section> {
        let mut content = element.trimmed_text()?;
        let label = element
            .attr("Label")
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from);
        let name = match element.attr("NlmCategory").map(str::trim) {
            Some(category) if !category.is_empty() => capitalize(category),
            _ if label.is_some() => "Unassigned".to_string(),
            _ => "Abstract".to_string(),
        };
        let truncated = TRUNCATION_REGEX.is_match(&content);
        if truncated {
            content = TRUNCATION_REGEX.replace(&content, "").trim_end().to_string();
            if content.is_empty() {
                content = " ".to_string();
            }
        }
        Some(Section {
            seq: 0,
            name,
            label,
            content,
            truncated,
        })
    }

    fn map_other_abstract(&mut self, element: &XmlElement) {
        let source = match element.attr("Type").map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => {
                warn!(pmid = self.pmid, "OtherAbstract without Type; ignoring");
                return;
            }
        };
        let children: Vec<_> = element.children().collect();
        let is_stub = source == "Publisher"
            && children.len() == 1
            && children[0].name == "AbstractText"
            && children[0].trimmed_text().as_deref() == Some(PUBLISHER_STUB_ABSTRACT);
        if is_stub {
            debug!(pmid = self.pmid, "Dropping publisher stub abstract");
            return;
        }
        self.map_abstract(element, &source);
    }

    fn map_authors(&mut self, element: &XmlElement) {
        for child in element.children() {
            if let Some(mut author) = self.map_author(child) {
                author.pos = self.authors.len() as u16 + 1;
                self.authors.push(author);
            }
        }
    }

    fn map_author(&self, element: &XmlElement) -> Option<Author> {
        let mut name = None;
        let mut initials = None;
        let mut forename: Option<String> = None;
        let mut suffix = None;

        for child in element.children() {
            let text = match child.trimmed_text() {
                Some(text) => text,
                None => {
                    if child.name != "Identifier" && child.name != "AffiliationInfo" {
                        warn!(pmid = self.pmid, tag = %child.name, "Empty Author element");
                    }
                    continue;
                }
            };
            match child.name.as_str() {
                "LastName" => name = Some(text),
                "ForeName" => forename = Some(text.chars().take(MAX_FORENAME_CHARS).collect()),
                "Initials" => initials = Some(text),
                "Suffix" => suffix = Some(text),
                "CollectiveName" => {
                    name = Some(text);
                    initials = Some(String::new());
                    forename = Some(String::new());
                    suffix = Some(String::new());
                }
                "Identifier" | "Affiliation" | "AffiliationInfo" => {}
                other => {
                    warn!(pmid = self.pmid, tag = other, value = %text, "Unknown Author element")
                }
            }
        }

        let name = match name {
            Some(n) => n,
            None => {
                warn!(pmid = self.pmid, "Author without LastName or CollectiveName; skipping");
                return None;
            }
        };
        // a forename that only spells out the initials carries no information
        if let (Some(f), Some(i)) = (forename.as_deref(), initials.as_deref()) {
            if !i.is_empty() && f.replace(' ', "") == i {
                forename = None;
            }
        }
        Some(Author {
            pos: 0,
            name,
            initials,
            forename,
            suffix,
        })
    }

    fn map_chemicals(&mut self, element: &XmlElement) {
        for chemical in element.children() {
            let name = match chemical
                .child("NameOfSubstance")
                .and_then(XmlElement::trimmed_text)
            {
                Some(n) => n,
                None => {
                    warn!(pmid = self.pmid, "Chemical without NameOfSubstance; skipping");
                    continue;
                }
            };
            let uid = chemical
                .child("RegistryNumber")
                .and_then(XmlElement::trimmed_text)
                .filter(|uid| uid != "0");
            self.chemicals.push(Chemical {
                idx: self.chemicals.len() as u16 + 1,
                uid,
                name,
            });
        }
    }

    fn map_databank(&mut self, element: &XmlElement) {
        let name = match element.child("DataBankName").and_then(XmlElement::trimmed_text) {
            Some(n) => n,
            None => {
                warn!(pmid = self.pmid, "DataBank without DataBankName; skipping");
                return;
            }
        };
        let accessions = element
            .child("AccessionNumberList")
            .into_iter()
            .flat_map(|list| list.children_named("AccessionNumber"))
            .filter_map(XmlElement::trimmed_text);
        for accession in accessions {
            if self.databases_seen.insert((name.clone(), accession.clone())) {
                self.databases.push(Database {
                    name: name.clone(),
                    accession,
                });
            }
        }
    }

    fn push_identifier(&mut self, namespace: String, value: String) {
        self.namespaces.insert(namespace.clone());
        self.identifiers.push(Identifier { namespace, value });
    }

    fn map_elocation(&mut self, element: &XmlElement) {
        let namespace = element.attr("EIdType").map(|t| t.trim().to_lowercase());
        let (namespace, value) = match (namespace, element.trimmed_text()) {
            (Some(ns), Some(value)) if !ns.is_empty() => (ns, value),
            _ => {
                warn!(pmid = self.pmid, "Malformed ELocationID; ignoring");
                return;
            }
        };
        if !self.namespaces.contains(&namespace) {
            self.push_identifier(namespace, value);
        }
    }

    fn map_other_id(&mut self, element: &XmlElement) {
        if element.attr("Source").map(str::trim) != Some(PMC_OTHER_ID_SOURCE) {
            return;
        }
        let Some(text) = element.trimmed_text() else {
            return;
        };
        if text.starts_with("PMC") && !self.namespaces.contains(PMC_NAMESPACE) {
            let value = text.split_whitespace().next().unwrap_or_default().to_string();
            self.push_identifier(PMC_NAMESPACE.to_string(), value);
        }
    }

    fn map_article_id(&mut self, element: &XmlElement) {
        let namespace = element.attr("IdType").map(|t| t.trim().to_lowercase());
        let (namespace, value) = match (namespace, element.trimmed_text()) {
            (Some(ns), Some(value)) if !ns.is_empty() => (ns, value),
            _ => {
                warn!(pmid = self.pmid, "Malformed ArticleId; ignoring");
                return;
            }
        };
        if !self.namespaces.contains(&namespace) {
            self.push_identifier(namespace, value);
        } else if DOI_REGEX.is_match(&value) && !self.namespaces.contains("doi") {
            self.push_identifier("doi".to_string(), value);
        } else {
            debug!(pmid = self.pmid, namespace = %namespace, value = %value, "Skipping duplicate identifier");
        }
    }

    fn map_keywords(&mut self, element: &XmlElement) {
        let owner = element
            .attr("Owner")
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(NLM_SOURCE)
            .to_uppercase();
        for (cnt, keyword) in element.children_named("Keyword").enumerate() {
            let text = keyword.text();
            let text = text.trim();
            let text = match text.find('\r') {
                Some(cut) => &text[..cut],
                None => text,
            };
            self.keywords.push(Keyword {
                owner: owner.clone(),
                cnt: cnt as u16 + 1,
                name: text.trim().to_string(),
                major: is_major(keyword),
            });
        }
    }

    fn map_mesh(&mut self, element: &XmlElement) {
        for heading in element.children_named("MeshHeading") {
            let descriptor = heading.child("DescriptorName");
            let name = match descriptor.and_then(XmlElement::trimmed_text) {
                Some(n) => n,
                None => {
                    warn!(pmid = self.pmid, "MeshHeading without DescriptorName; skipping");
                    continue;
                }
            };
            let qualifiers = heading
                .children_named("QualifierName")
                .filter_map(|q| q.trimmed_text().map(|name| (name, is_major(q))))
                .enumerate()
                .map(|(sub, (name, major))| Qualifier {
                    sub: sub as u16 + 1,
                    name,
                    major,
                })
                .collect();
            self.descriptors.push(Descriptor {
                num: self.descriptors.len() as u16 + 1,
                name,
                major: descriptor.is_some_and(is_major),
                qualifiers,
            });
        }
    }

    fn map_publication_type(&mut self, element: &XmlElement) {
        if let Some(value) = element.trimmed_text() {
            self.publication_types.push(value.to_uppercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CitationReader, RawRecord};

    fn element(xml: &str) -> XmlElement {
        match CitationReader::new(xml.as_bytes()).next() {
            Some(Ok(RawRecord::Citation(e))) => e,
            other => panic!("expected a citation, got {:?}", other),
        }
    }

    fn citation(body: &str) -> String {
        format!(
            r#"<MedlineCitation Status="MEDLINE" Owner="NLM">
  <PMID Version="1">123</PMID>
  <DateCreated><Year>2010</Year><Month>02</Month><Day>03</Day></DateCreated>
  <Article>
    <Journal><JournalIssue><Volume>12</Volume><Issue>3</Issue>
      <PubDate><Year>2010</Year><Month>Feb</Month></PubDate></JournalIssue></Journal>
    {body}
  </Article>
  <MedlineJournalInfo><MedlineTA>J Test</MedlineTA></MedlineJournalInfo>
</MedlineCitation>"#
        )
    }

    fn map(body: &str) -> MappedCitation {
        map_citation(&element(&citation(body))).unwrap()
    }

    #[test]
    fn maps_basic_fields() {
        let m = map("<ArticleTitle>A title.</ArticleTitle><Pagination><MedlinePgn>1-9</MedlinePgn></Pagination>");
        assert_eq!(m.pmid, 123);
        assert_eq!(m.status, "MEDLINE");
        assert_eq!(m.title, "A title.");
        assert_eq!(m.journal, "J Test");
        assert_eq!(m.pub_date, "2010 Feb");
        assert_eq!(m.issue.as_deref(), Some("12(3)"));
        assert_eq!(m.pagination.as_deref(), Some("1-9"));
        assert_eq!(m.created, NaiveDate::from_ymd_opt(2010, 2, 3).unwrap());
    }

    #[test]
    fn title_falls_back_to_vernacular_then_placeholder() {
        let m = map("<ArticleTitle></ArticleTitle><VernacularTitle>Titre.</VernacularTitle>");
        assert_eq!(m.title, "Titre.");
        let m = map("<ArticleTitle/>");
        assert_eq!(m.title, UNKNOWN_TITLE);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (value, output)
    }

    #[test]
    fn placeholder_title_is_logged_as_warning() {
        let (m, output) = logged(|| map("<ArticleTitle/>"));
        assert_eq!(m.title, UNKNOWN_TITLE);
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("No title found; using placeholder title"), "{output}");

        let (m, output) = logged(|| map("<ArticleTitle>Present.</ArticleTitle>"));
        assert_eq!(m.title, "Present.");
        assert!(!output.contains("placeholder"), "{output}");
    }

    #[test]
    fn missing_journal_is_structural() {
        let xml = r#"<MedlineCitation Status="MEDLINE"><PMID>5</PMID>
  <DateCreated><Year>2010</Year></DateCreated>
  <Article><Journal><JournalIssue><PubDate><Year>2010</Year></PubDate></JournalIssue></Journal>
  <ArticleTitle>T</ArticleTitle></Article></MedlineCitation>"#;
        let err = map_citation(&element(xml)).unwrap_err();
        assert!(matches!(err, Error::Structural { pmid: Some(5), .. }));
    }

    #[test]
    fn missing_pmid_is_structural() {
        let xml = r#"<MedlineCitation Status="MEDLINE"><PMID>abc</PMID></MedlineCitation>"#;
        let err = map_citation(&element(xml)).unwrap_err();
        assert!(matches!(err, Error::Structural { pmid: None, .. }));
    }

    #[test]
    fn created_falls_back_to_completed() {
        let xml = r#"<MedlineCitation Status="MEDLINE"><PMID>5</PMID>
  <DateCompleted><Year>2011</Year><Month>3</Month><Day>4</Day></DateCompleted>
  <Article><Journal><JournalIssue><PubDate><MedlineDate>2010 Jan-Feb</MedlineDate></PubDate></JournalIssue></Journal>
  <ArticleTitle>T</ArticleTitle></Article>
  <MedlineJournalInfo><MedlineTA>J</MedlineTA></MedlineJournalInfo></MedlineCitation>"#;
        let m = map_citation(&element(xml)).unwrap();
        assert_eq!(m.created, NaiveDate::from_ymd_opt(2011, 3, 4).unwrap());
        assert_eq!(m.pub_date, "2010 Jan-Feb");
    }

    #[test]
    fn abstract_sections_and_truncation() {
        let m = map(
            r#"<ArticleTitle>T</ArticleTitle>
<Abstract>
  <AbstractText Label="BACKGROUND" NlmCategory="BACKGROUND">Some <i>text</i>.</AbstractText>
  <AbstractText Label="MISC">Labelled.</AbstractText>
  <AbstractText>Cut here (ABSTRACT TRUNCATED AT 250 WORDS)</AbstractText>
  <AbstractText>(ABSTRACT TRUNCATED AT 400 WORDS)</AbstractText>
  <AbstractText>   </AbstractText>
  <CopyrightInformation>(c) Someone</CopyrightInformation>
</Abstract>"#,
        );
        assert_eq!(m.abstracts.len(), 1);
        let a = &m.abstracts[0];
        assert_eq!(a.source, "NLM");
        assert_eq!(a.copyright.as_deref(), Some("(c) Someone"));
        assert_eq!(a.sections.len(), 4);
        assert_eq!(a.sections[0].name, "Background");
        assert_eq!(a.sections[0].content, "Some text.");
        assert_eq!(a.sections[1].name, "Unassigned");
        assert_eq!(a.sections[1].label.as_deref(), Some("MISC"));
        assert_eq!(a.sections[2].name, "Abstract");
        assert_eq!(a.sections[2].content, "Cut here");
        assert!(a.sections[2].truncated);
        assert_eq!(a.sections[3].content, " ");
        assert!(a.sections[3].truncated);
    }

    #[test]
    fn publisher_stub_abstract_is_dropped() {
        let xml = citation("<ArticleTitle>T</ArticleTitle>")
            .replace(
                "</Article>",
                "</Article><OtherAbstract Type=\"Publisher\"><AbstractText>Abstract available from the publisher.</AbstractText></OtherAbstract>\
                 <OtherAbstract Type=\"KIE\"><AbstractText>Other text.</AbstractText></OtherAbstract>",
            );
        let m = map_citation(&element(&xml)).unwrap();
        assert_eq!(m.abstracts.len(), 1);
        assert_eq!(m.abstracts[0].source, "KIE");
    }

    #[test]
    fn authors_personal_and_collective() {
        let m = map(
            r#"<ArticleTitle>T</ArticleTitle><AuthorList>
  <Author><LastName>Smith</LastName><ForeName>J A</ForeName><Initials>JA</Initials></Author>
  <Author><LastName>Doe</LastName><ForeName>Jane</ForeName><Initials>J</Initials><Suffix>Jr</Suffix>
    <AffiliationInfo><Affiliation>Somewhere</Affiliation></AffiliationInfo></Author>
  <Author><ForeName>Nameless</ForeName></Author>
  <Author><CollectiveName>The Consortium</CollectiveName></Author>
</AuthorList>"#,
        );
        assert_eq!(m.authors.len(), 3);
        assert_eq!(m.authors[0].forename, None);
        assert_eq!(m.authors[1].pos, 2);
        assert_eq!(m.authors[1].forename.as_deref(), Some("Jane"));
        assert_eq!(m.authors[1].suffix.as_deref(), Some("Jr"));
        assert_eq!(m.authors[2].pos, 3);
        assert!(m.authors[2].is_corporate());
        assert_eq!(m.authors[2].name, "The Consortium");
    }

    #[test]
    fn identifiers_first_per_namespace() {
        let xml = citation(
            r#"<ArticleTitle>T</ArticleTitle>
<ELocationID EIdType="doi">10.1/a</ELocationID><ELocationID EIdType="doi">10.1/b</ELocationID>
<ELocationID EIdType="pii">S123</ELocationID>"#,
        )
        .replace(
            "</MedlineCitation>",
            "<OtherID Source=\"NLM\">PMC12345 [Available on 2011-01-01]</OtherID>\
             <OtherID Source=\"NLM\">PMC999</OtherID><OtherID Source=\"NASA\">PMC1</OtherID></MedlineCitation>",
        );
        let m = map_citation(&element(&xml)).unwrap();
        let ids: Vec<_> = m
            .identifiers
            .iter()
            .map(|i| (i.namespace.as_str(), i.value.as_str()))
            .collect();
        assert_eq!(ids, vec![("doi", "10.1/a"), ("pii", "S123"), ("pmc", "PMC12345")]);
    }

    #[test]
    fn online_variant_reads_article_ids() {
        let xml = format!(
            "<PubmedArticle>{}<PubmedData><ArticleIdList>\
             <ArticleId IdType=\"pubmed\">123</ArticleId>\
             <ArticleId IdType=\"pii\">X1</ArticleId>\
             <ArticleId IdType=\"pii\">10.5/xyz</ArticleId>\
             </ArticleIdList><ReferenceList><Reference><ArticleIdList>\
             <ArticleId IdType=\"pmc\">PMC1</ArticleId></ArticleIdList></Reference></ReferenceList>\
             </PubmedData></PubmedArticle>",
            citation("<ArticleTitle>T</ArticleTitle>")
        );
        let m = map_citation(&element(&xml)).unwrap();
        let ids: Vec<_> = m
            .identifiers
            .iter()
            .map(|i| (i.namespace.as_str(), i.value.as_str()))
            .collect();
        assert_eq!(ids, vec![("pubmed", "123"), ("pii", "X1"), ("doi", "10.5/xyz")]);
    }

    #[test]
    fn keywords_chemicals_mesh_and_databanks() {
        let xml = citation(
            r#"<ArticleTitle>T</ArticleTitle><DataBankList><DataBank><DataBankName>GENBANK</DataBankName>
<AccessionNumberList><AccessionNumber>A1</AccessionNumber><AccessionNumber>A1</AccessionNumber>
<AccessionNumber>B2</AccessionNumber></AccessionNumberList></DataBank></DataBankList>
<PublicationTypeList><PublicationType>Journal Article</PublicationType></PublicationTypeList>"#,
        )
        .replace(
            "</MedlineCitation>",
            r#"<ChemicalList><Chemical><RegistryNumber>0</RegistryNumber><NameOfSubstance>Water</NameOfSubstance></Chemical>
<Chemical><RegistryNumber>50-00-0</RegistryNumber><NameOfSubstance>Formaldehyde</NameOfSubstance></Chemical></ChemicalList>
<MeshHeadingList><MeshHeading><DescriptorName MajorTopicYN="Y">Humans</DescriptorName>
<QualifierName MajorTopicYN="N">genetics</QualifierName><QualifierName MajorTopicYN="Y">metabolism</QualifierName></MeshHeading></MeshHeadingList>
<KeywordList Owner="pip"><Keyword MajorTopicYN="Y">first&#13;rest</Keyword><Keyword> </Keyword></KeywordList>
</MedlineCitation>"#,
        );
        let m = map_citation(&element(&xml)).unwrap();

        assert_eq!(m.publication_types, vec!["JOURNAL ARTICLE".to_string()]);
        assert_eq!(m.databases.len(), 2);
        assert_eq!(m.chemicals[0].uid, None);
        assert_eq!(m.chemicals[1].uid.as_deref(), Some("50-00-0"));
        assert_eq!(m.chemicals[1].idx, 2);

        let d = &m.descriptors[0];
        assert!(d.major);
        assert_eq!(d.qualifiers.len(), 2);
        assert!(!d.qualifiers[0].major);
        assert_eq!(d.qualifiers[1].sub, 2);

        assert_eq!(m.keywords.len(), 2);
        assert_eq!(m.keywords[0].owner, "PIP");
        assert_eq!(m.keywords[0].name, "first");
        assert!(m.keywords[0].major);
        assert_eq!(m.keywords[1].name, "");
    }

    #[test]
    fn month_parsing() {
        assert_eq!(parse_month("03"), Some(3));
        assert_eq!(parse_month("Dec"), Some(12));
        assert_eq!(parse_month("Spring"), None);
    }

    #[test]
    fn capitalize_like_python() {
        assert_eq!(capitalize("BACKGROUND"), "Background");
        assert_eq!(capitalize("methods"), "Methods");
        assert_eq!(capitalize(""), "");
    }
}
