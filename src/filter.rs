use crate::parser::XmlElement;

/// Which versions of a citation are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Only citations whose version marker is absent or "1"
    #[default]
    Canonical,
    /// Every version
    Permissive,
}

impl VersionPolicy {
    pub fn from_all_versions(all_versions: bool) -> Self {
        if all_versions {
            VersionPolicy::Permissive
        } else {
            VersionPolicy::Canonical
        }
    }

    pub fn accepts(&self, marker: Option<&str>) -> bool {
        match self {
            VersionPolicy::Permissive => true,
            VersionPolicy::Canonical => marker.map_or(true, |m| m.trim() == "1"),
        }
    }
}

/// `MedlineCitation@VersionID`, else `PMID@Version`.
pub fn version_marker(root: &XmlElement) -> Option<&str> {
    let medline = if root.name == "PubmedArticle" {
        root.child("MedlineCitation")?
    } else {
        root
    };
    medline
        .attr("VersionID")
        .or_else(|| medline.child("PMID").and_then(|p| p.attr("Version")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CitationReader, RawRecord};

    fn root(xml: &str) -> XmlElement {
        match CitationReader::new(xml.as_bytes()).next() {
            Some(Ok(RawRecord::Citation(e))) => e,
            other => panic!("expected a citation, got {:?}", other),
        }
    }

    #[test]
    fn canonical_accepts_absent_or_first_version() {
        let policy = VersionPolicy::default();
        assert!(policy.accepts(None));
        assert!(policy.accepts(Some("1")));
        assert!(policy.accepts(Some(" 1 ")));
        assert!(!policy.accepts(Some("2")));
        assert!(!policy.accepts(Some("")));
    }

    #[test]
    fn permissive_accepts_everything() {
        let policy = VersionPolicy::from_all_versions(true);
        assert!(policy.accepts(Some("7")));
        assert!(policy.accepts(None));
    }

    #[test]
    fn marker_prefers_version_id() {
        let e = root(r#"<MedlineCitation VersionID="3"><PMID Version="1">1</PMID></MedlineCitation>"#);
        assert_eq!(version_marker(&e), Some("3"));
        let e = root(r#"<MedlineCitation><PMID Version="2">1</PMID></MedlineCitation>"#);
        assert_eq!(version_marker(&e), Some("2"));
        let e = root(r#"<MedlineCitation><PMID>1</PMID></MedlineCitation>"#);
        assert_eq!(version_marker(&e), None);
    }

    #[test]
    fn marker_inside_pubmed_article() {
        let e = root(
            r#"<PubmedArticle><MedlineCitation VersionID="2"><PMID>1</PMID></MedlineCitation></PubmedArticle>"#,
        );
        assert_eq!(version_marker(&e), Some("2"));
    }
}
