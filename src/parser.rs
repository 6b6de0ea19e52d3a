//! Streaming reader over MEDLINE/PubMed XML.
//!
//! Only one record subtree is materialized at a time: the reader skips
//! everything outside `MedlineCitation`, `PubmedArticle` and `DeleteCitation`
//! elements and hands each of those back as a small owned tree.

use crate::error::{Error, Result};
use crate::models::Pmid;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;
use std::io::{self, BufRead};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Text(String),
    Element(XmlElement),
}

/// An owned element with its attributes and mixed content, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub nodes: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.nodes.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children().filter(move |e| e.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children().find(|e| e.name == name)
    }

    /// Follows a `/`-separated path of child names, e.g. `Journal/JournalIssue/PubDate`.
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .try_fold(self, |element, name| element.child(name))
    }

    /// All descendant text concatenated, inline markup flattened.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.nodes {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Trimmed text, or `None` when the element holds only whitespace.
    pub fn trimmed_text(&self) -> Option<String> {
        let text = self.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn push_text(&mut self, text: Cow<'_, str>) {
        if let Some(XmlNode::Text(last)) = self.nodes.last_mut() {
            last.push_str(&text);
        } else {
            self.nodes.push(XmlNode::Text(text.into_owned()));
        }
    }
}

/// One unit of input: a citation subtree or a batch of deletion markers.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// A `MedlineCitation` (bulk files) or `PubmedArticle` (eUtils) element
    Citation(XmlElement),
    /// PMIDs listed in a `DeleteCitation` element
    Deletion(Vec<Pmid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Citation,
    Deletion,
    Ignored,
}

impl RootKind {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"MedlineCitation" | b"PubmedArticle" => Some(RootKind::Citation),
            b"DeleteCitation" => Some(RootKind::Deletion),
            b"PubmedBookArticle" => Some(RootKind::Ignored),
            _ => None,
        }
    }
}

pub struct CitationReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> CitationReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(false);
        reader.expand_empty_elements(false);
        Self {
            reader,
            buf: Vec::with_capacity(64 * 1024),
            finished: false,
        }
    }

    fn xml_error(&self, source: quick_xml::Error) -> Error {
        Error::Xml {
            position: self.reader.buffer_position(),
            source,
        }
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            self.buf.clear();
            let (kind, root) = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => match RootKind::from_tag(e.name().as_ref()) {
                    Some(kind) => (kind, element_from(&e)),
                    None => continue,
                },
                Ok(Event::Empty(e)) => {
                    if e.name().as_ref() == b"DeleteCitation" {
                        return Ok(Some(RawRecord::Deletion(Vec::new())));
                    }
                    continue;
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => continue,
                Err(e) => return Err(self.xml_error(e)),
            };
            let root = root.map_err(|e| self.xml_error(e))?;
            let element = self.read_subtree(root)?;

            return Ok(Some(match kind {
                RootKind::Citation => RawRecord::Citation(element),
                RootKind::Deletion => RawRecord::Deletion(deleted_pmids(&element)),
                RootKind::Ignored => {
                    debug!(tag = %element.name, "Ignoring record");
                    continue;
                }
            }));
        }
    }

    /// Reads events until `root` closes, building the subtree in place.
    fn read_subtree(&mut self, root: XmlElement) -> Result<XmlElement> {
        let mut stack = vec![root];
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    let element = element_from(&e).map_err(|e| self.xml_error(e))?;
                    stack.push(element);
                }
                Ok(Event::Empty(e)) => {
                    let element = element_from(&e).map_err(|e| self.xml_error(e))?;
                    if let Some(parent) = stack.last_mut() {
                        parent.nodes.push(XmlNode::Element(element));
                    }
                }
                Ok(Event::End(_)) => {
                    let done = stack.pop();
                    match (done, stack.last_mut()) {
                        (Some(done), Some(parent)) => parent.nodes.push(XmlNode::Element(done)),
                        (Some(done), None) => return Ok(done),
                        (None, _) => unreachable!("element stack emptied before its root closed"),
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "Undecodable text; keeping it verbatim");
                            Cow::Owned(String::from_utf8_lossy(e.as_ref()).into_owned())
                        }
                    };
                    if let Some(top) = stack.last_mut() {
                        top.push_text(text);
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    if let Some(top) = stack.last_mut() {
                        top.push_text(Cow::Owned(text));
                    }
                }
                Ok(Event::Eof) => {
                    let open = stack.first().map(|e| e.name.clone()).unwrap_or_default();
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("input ended inside <{open}>"),
                    )));
                }
                Ok(_) => {}
                Err(e) => return Err(self.xml_error(e)),
            }
        }
    }
}

impl<R: BufRead> Iterator for CitationReader<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> std::result::Result<XmlElement, quick_xml::Error> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn deleted_pmids(element: &XmlElement) -> Vec<Pmid> {
    element
        .children_named("PMID")
        .filter_map(|e| {
            let text = e.text();
            match text.trim().parse::<Pmid>() {
                Ok(pmid) if pmid > 0 => Some(pmid),
                _ => {
                    warn!(value = %text.trim(), "Ignoring malformed PMID in DeleteCitation");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(xml: &str) -> Vec<RawRecord> {
        CitationReader::new(xml.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn reads_citations_and_deletions() {
        let xml = r#"<?xml version="1.0"?>
<MedlineCitationSet>
  <MedlineCitation Status="MEDLINE"><PMID>1</PMID></MedlineCitation>
  <MedlineCitation Status="MEDLINE"><PMID>2</PMID></MedlineCitation>
  <DeleteCitation><PMID>3</PMID><PMID>4</PMID></DeleteCitation>
</MedlineCitationSet>"#;
        let records = read_all(xml);
        assert_eq!(records.len(), 3);
        match &records[0] {
            RawRecord::Citation(e) => {
                assert_eq!(e.name, "MedlineCitation");
                assert_eq!(e.attr("Status"), Some("MEDLINE"));
                assert_eq!(e.child("PMID").unwrap().text(), "1");
            }
            other => panic!("unexpected record {:?}", other),
        }
        assert_eq!(records[2], RawRecord::Deletion(vec![3, 4]));
    }

    #[test]
    fn pubmed_article_is_one_record() {
        let xml = r#"<PubmedArticleSet><PubmedArticle>
  <MedlineCitation><PMID>7</PMID></MedlineCitation>
  <PubmedData><ArticleIdList><ArticleId IdType="doi">10.1/x</ArticleId></ArticleIdList></PubmedData>
</PubmedArticle></PubmedArticleSet>"#;
        let records = read_all(xml);
        assert_eq!(records.len(), 1);
        match &records[0] {
            RawRecord::Citation(e) => {
                assert_eq!(e.name, "PubmedArticle");
                assert_eq!(e.find("MedlineCitation/PMID").unwrap().text(), "7");
                assert_eq!(
                    e.find("PubmedData/ArticleIdList/ArticleId")
                        .unwrap()
                        .attr("IdType"),
                    Some("doi")
                );
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn text_flattens_inline_markup_and_entities() {
        let xml = "<MedlineCitation><AbstractText>H<sub>2</sub>O &amp; <i>E. coli</i></AbstractText></MedlineCitation>";
        let records = read_all(xml);
        let RawRecord::Citation(e) = &records[0] else {
            panic!("expected a citation");
        };
        assert_eq!(e.child("AbstractText").unwrap().text(), "H2O & E. coli");
    }

    #[test]
    fn trimmed_text_of_blank_element_is_none() {
        let xml = "<MedlineCitation><ArticleTitle>  </ArticleTitle><Empty/></MedlineCitation>";
        let records = read_all(xml);
        let RawRecord::Citation(e) = &records[0] else {
            panic!("expected a citation");
        };
        assert_eq!(e.child("ArticleTitle").unwrap().trimmed_text(), None);
        assert!(e.child("Empty").is_some());
    }

    #[test]
    fn malformed_deletion_pmids_are_dropped() {
        let xml = "<Set><DeleteCitation><PMID>x</PMID><PMID> 12 </PMID></DeleteCitation></Set>";
        assert_eq!(read_all(xml), vec![RawRecord::Deletion(vec![12])]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let xml = "<Set><MedlineCitation><PMID>1</PMID>";
        let results: Vec<_> = CitationReader::new(xml.as_bytes()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn book_articles_are_skipped() {
        let xml = "<Set><PubmedBookArticle><BookDocument><PMID>5</PMID></BookDocument></PubmedBookArticle>\
                   <MedlineCitation><PMID>6</PMID></MedlineCitation></Set>";
        let records = read_all(xml);
        assert_eq!(records.len(), 1);
    }
}
