//! Structural repairs and validation that turn mapped fields into a `Citation`.

use crate::error::{Error, Result};
use crate::mapper::MappedCitation;
use crate::models::{Citation, Keyword};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

static YEAR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

/// The first four-digit token of a publication date, or 0.
pub fn derive_year(pub_date: &str) -> i32 {
    YEAR_REGEX
        .captures(pub_date)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

pub fn assemble(mapped: MappedCitation) -> Result<Citation> {
    let pmid = mapped.pmid;
    if pmid == 0 {
        return Err(Error::structural(None, "PMID must be positive"));
    }
    if mapped.title.trim().is_empty() {
        return Err(Error::structural(Some(pmid), "empty title"));
    }

    let mut seen = FxHashSet::default();
    let publication_types = mapped
        .publication_types
        .into_iter()
        .filter(|pt| seen.insert(pt.clone()))
        .collect();

    let mut abstracts = mapped.abstracts;
    for a in &mut abstracts {
        for (seq, section) in a.sections.iter_mut().enumerate() {
            section.seq = seq as u16 + 1;
        }
    }

    let keywords = dedup_keywords(pmid, mapped.keywords);

    let mut authors = mapped.authors;
    for author in authors.iter_mut().filter(|a| a.initials.is_none()) {
        author.initials = author.effective_initials();
        if let Some(initials) = &author.initials {
            debug!(pmid, name = %author.name, initials = %initials, "Initials derived from forename");
        }
    }

    Ok(Citation {
        pmid,
        status: mapped.status,
        year: derive_year(&mapped.pub_date),
        title: mapped.title,
        journal: mapped.journal,
        pub_date: mapped.pub_date,
        issue: mapped.issue,
        pagination: mapped.pagination,
        created: mapped.created,
        completed: mapped.completed,
        revised: mapped.revised,
        modified: mapped.modified,
        abstracts,
        authors,
        publication_types,
        descriptors: mapped.descriptors,
        identifiers: mapped.identifiers,
        databases: mapped.databases,
        chemicals: mapped.chemicals,
        keywords,
    })
}

/// Drops blank and repeated keywords, then renumbers `cnt` per owner.
fn dedup_keywords(pmid: u32, keywords: Vec<Keyword>) -> Vec<Keyword> {
    let mut seen = FxHashSet::default();
    let mut counts: FxHashMap<String, u16> = FxHashMap::default();
    keywords
        .into_iter()
        .filter(|k| {
            if k.name.trim().is_empty() {
                debug!(pmid, owner = %k.owner, "Dropping empty keyword");
                return false;
            }
            if !seen.insert((k.owner.clone(), k.name.clone())) {
                debug!(pmid, owner = %k.owner, keyword = %k.name, "Dropping duplicate keyword");
                return false;
            }
            true
        })
        .map(|mut k| {
            let cnt = counts.entry(k.owner.clone()).or_insert(0);
            *cnt += 1;
            k.cnt = *cnt;
            k
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Abstract, Author, Section};
    use chrono::NaiveDate;

    fn mapped() -> MappedCitation {
        MappedCitation {
            pmid: 1,
            status: "MEDLINE".to_string(),
            title: "Title".to_string(),
            journal: "J".to_string(),
            pub_date: "2001 Jan".to_string(),
            issue: None,
            pagination: None,
            created: NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            completed: None,
            revised: None,
            modified: None,
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

    fn keyword(owner: &str, name: &str) -> Keyword {
        Keyword {
            owner: owner.to_string(),
            cnt: 0,
            name: name.to_string(),
            major: false,
        }
    }

    #[test]
    fn year_from_pub_date() {
        assert_eq!(derive_year("2001 Jan"), 2001);
        assert_eq!(derive_year("Winter 1998-1999"), 1998);
        assert_eq!(derive_year("Spring"), 0);
        assert_eq!(derive_year("12345"), 0);
    }

    #[test]
    fn publication_types_deduplicated() {
        let mut m = mapped();
        m.publication_types = vec!["A".into(), "B".into(), "A".into()];
        let c = assemble(m).unwrap();
        assert_eq!(c.publication_types, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn keywords_deduplicated_and_renumbered() {
        let mut m = mapped();
        m.keywords = vec![
            keyword("NLM", "foo"),
            keyword("NLM", "foo"),
            keyword("NLM", ""),
            keyword("NOTNLM", "foo"),
            keyword("NLM", "bar"),
        ];
        let c = assemble(m).unwrap();
        let got: Vec<_> = c
            .keywords
            .iter()
            .map(|k| (k.owner.as_str(), k.cnt, k.name.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("NLM", 1, "foo"), ("NOTNLM", 1, "foo"), ("NLM", 2, "bar")]
        );
    }

    #[test]
    fn sections_sequenced_per_abstract() {
        let section = |content: &str| Section {
            seq: 0,
            name: "Abstract".to_string(),
            label: None,
            content: content.to_string(),
            truncated: false,
        };
        let mut m = mapped();
        m.abstracts = vec![
            Abstract {
                source: "NLM".into(),
                copyright: None,
                sections: vec![section("a"), section("b")],
            },
            Abstract {
                source: "KIE".into(),
                copyright: None,
                sections: vec![section("c")],
            },
        ];
        let c = assemble(m).unwrap();
        assert_eq!(c.abstracts[0].sections[1].seq, 2);
        assert_eq!(c.abstracts[1].sections[0].seq, 1);
        assert_eq!(c.year, 2001);
    }

    #[test]
    fn missing_initials_come_from_forename() {
        let author = |initials: Option<&str>, forename: Option<&str>| Author {
            pos: 1,
            name: "Smith".to_string(),
            initials: initials.map(String::from),
            forename: forename.map(String::from),
            suffix: None,
        };
        let mut m = mapped();
        m.authors = vec![
            author(None, Some("John Paul")),
            author(Some("X"), Some("John")),
            author(None, None),
            author(Some(""), Some("")),
        ];
        let c = assemble(m).unwrap();
        let initials: Vec<_> = c.authors.iter().map(|a| a.initials.as_deref()).collect();
        assert_eq!(initials, vec![Some("JP"), Some("X"), None, Some("")]);
    }

    #[test]
    fn rejects_empty_title_and_zero_pmid() {
        let mut m = mapped();
        m.title = " ".into();
        assert!(matches!(assemble(m), Err(Error::Structural { .. })));
        let mut m = mapped();
        m.pmid = 0;
        assert!(matches!(assemble(m), Err(Error::Structural { pmid: None, .. })));
    }
}
