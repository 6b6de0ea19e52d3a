use chrono::NaiveDate;
use std::collections::BTreeSet;

/// PubMed identifier; always positive
pub type Pmid = u32;

/// One MEDLINE/PubMed record and everything it owns.
///
/// Child collections keep source-document order. Qualifiers are nested inside
/// their descriptor and sections inside their abstract, so neither can exist
/// without its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub pmid: Pmid,
    pub status: String,
    pub title: String,
    pub journal: String,
    pub pub_date: String,
    pub year: i32,
    pub issue: Option<String>,
    pub pagination: Option<String>,
    pub created: NaiveDate,
    pub completed: Option<NaiveDate>,
    pub revised: Option<NaiveDate>,
    /// Set by the store on every write; `None` for freshly parsed graphs
    pub modified: Option<NaiveDate>,
    pub abstracts: Vec<Abstract>,
    pub authors: Vec<Author>,
    pub publication_types: Vec<String>,
    pub descriptors: Vec<Descriptor>,
    pub identifiers: Vec<Identifier>,
    pub databases: Vec<Database>,
    pub chemicals: Vec<Chemical>,
    pub keywords: Vec<Keyword>,
}

impl Citation {
    /// `pub_date; issue: pagination`, the way MEDLINE cites a journal issue.
    pub fn citation(&self) -> String {
        let mut out = self.pub_date.clone();
        if let Some(issue) = &self.issue {
            out.push_str("; ");
            out.push_str(issue);
        }
        if let Some(pagination) = &self.pagination {
            out.push_str(": ");
            out.push_str(pagination);
        }
        out
    }

    pub fn identifier(&self, namespace: &str) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|i| i.namespace == namespace)
            .map(|i| i.value.as_str())
    }

    pub fn abstract_for(&self, source: &str) -> Option<&Abstract> {
        self.abstracts.iter().find(|a| a.source == source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Abstract {
    /// "NLM" for the main abstract, the OtherAbstract `Type` otherwise
    pub source: String,
    pub copyright: Option<String>,
    pub sections: Vec<Section>,
}

impl Abstract {
    /// All section contents joined by single spaces.
    pub fn text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub seq: u16,
    pub name: String,
    pub label: Option<String>,
    pub content: String,
    /// The "(ABSTRACT TRUNCATED AT n WORDS)" marker was stripped from `content`
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub pos: u16,
    pub name: String,
    pub initials: Option<String>,
    pub forename: Option<String>,
    pub suffix: Option<String>,
}

impl Author {
    /// Collective names carry explicitly empty initials.
    pub fn is_corporate(&self) -> bool {
        matches!(self.initials.as_deref(), Some(""))
    }

    /// Forename (or initials), last name and suffix.
    pub fn full_name(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        match (self.forename.as_deref(), self.initials.as_deref()) {
            (Some(f), _) if !f.is_empty() => parts.push(f),
            (_, Some(i)) if !i.is_empty() => parts.push(i),
            _ => {}
        }
        parts.push(self.name.as_str());
        if let Some(suffix) = self.suffix.as_deref().filter(|s| !s.is_empty()) {
            parts.push(suffix);
        }
        parts.join(" ")
    }

    /// Initials as given, else the first letter of every forename part.
    pub fn effective_initials(&self) -> Option<String> {
        match (self.initials.as_deref(), self.forename.as_deref()) {
            (Some(i), _) if !i.is_empty() => Some(i.to_string()),
            (_, Some(f)) if !f.trim().is_empty() => Some(
                f.split_whitespace()
                    .filter_map(|part| part.chars().next())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Last name followed by initials, e.g. "Smith JA".
    pub fn short_name(&self) -> String {
        match self.effective_initials() {
            Some(i) => format!("{} {}", self.name, i),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub num: u16,
    pub name: String,
    pub major: bool,
    pub qualifiers: Vec<Qualifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Qualifier {
    pub sub: u16,
    pub name: String,
    pub major: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub namespace: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub name: String,
    pub accession: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chemical {
    pub idx: u16,
    pub uid: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub owner: String,
    pub cnt: u16,
    pub name: String,
    pub major: bool,
}

/// Which records a select or delete applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    ByIdentifiers(BTreeSet<Pmid>),
    AllRecords,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(initials: Option<&str>, forename: Option<&str>, suffix: Option<&str>) -> Author {
        Author {
            pos: 1,
            name: "Smith".to_string(),
            initials: initials.map(String::from),
            forename: forename.map(String::from),
            suffix: suffix.map(String::from),
        }
    }

    #[test]
    fn corporate_author_has_empty_initials() {
        assert!(author(Some(""), Some(""), Some("")).is_corporate());
        assert!(!author(None, None, None).is_corporate());
        assert!(!author(Some("J"), None, None).is_corporate());
    }

    #[test]
    fn full_name_prefers_forename() {
        assert_eq!(
            author(Some("JA"), Some("John A"), Some("Jr")).full_name(),
            "John A Smith Jr"
        );
        assert_eq!(author(Some("JA"), None, None).full_name(), "JA Smith");
        assert_eq!(author(None, None, None).full_name(), "Smith");
    }

    #[test]
    fn short_name_uses_initials() {
        assert_eq!(author(Some("JA"), Some("John"), None).short_name(), "Smith JA");
        assert_eq!(author(None, None, None).short_name(), "Smith");
        assert_eq!(author(None, Some("John"), None).short_name(), "Smith J");
        assert_eq!(author(None, Some("Jan  Anton"), None).short_name(), "Smith JA");
        assert_eq!(author(Some(""), Some(""), Some("")).short_name(), "Smith");
    }
}
