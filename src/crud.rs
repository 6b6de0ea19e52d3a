//! Create, upsert, delete and select citation graphs.
//!
//! Every write runs in its own transaction per PMID, so a failure never
//! leaves a partial graph behind.

use crate::config::QUERY_LIMIT;
use crate::error::{Error, Result};
use crate::models::{Citation, Pmid, Selection};
use crate::store::{delete_all, delete_graph, insert_graph, Store};
use chrono::Local;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Stores a new citation; `Error::Duplicate` if the PMID is already present.
pub async fn create(store: &Store, citation: &Citation) -> Result<()> {
    let mut tx = store.begin().await?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM citations WHERE pmid = ?)")
        .bind(i64::from(citation.pmid))
        .fetch_one(&mut *tx)
        .await?;
    if exists {
        return Err(Error::Duplicate(citation.pmid));
    }

    match insert_graph(&mut tx, citation, Local::now().date_naive()).await {
        Err(Error::Storage(sqlx::Error::Database(e))) if e.is_unique_violation() => {
            Err(Error::Duplicate(citation.pmid))
        }
        Err(e) => Err(e),
        Ok(()) => {
            tx.commit().await?;
            debug!(pmid = citation.pmid, "Created citation");
            Ok(())
        }
    }
}

/// Replaces whatever is stored under the citation's PMID, atomically.
pub async fn upsert(store: &Store, citation: &Citation) -> Result<()> {
    let mut tx = store.begin().await?;
    let replaced = delete_graph(&mut tx, citation.pmid).await?;
    insert_graph(&mut tx, citation, Local::now().date_naive()).await?;
    tx.commit().await?;
    debug!(pmid = citation.pmid, replaced, "Upserted citation");
    Ok(())
}

/// Deletes the selected citations; missing PMIDs are ignored. Returns the
/// number of citations actually removed.
pub async fn delete(store: &Store, selection: Selection) -> Result<u64> {
    match selection {
        Selection::AllRecords => {
            let mut tx = store.begin().await?;
            let deleted = delete_all(&mut tx).await?;
            tx.commit().await?;
            info!(deleted, "Deleted all citations");
            Ok(deleted)
        }
        Selection::ByIdentifiers(pmids) => {
            let mut deleted = 0;
            for pmid in pmids {
                let mut tx = store.begin().await?;
                if delete_graph(&mut tx, pmid).await? {
                    deleted += 1;
                } else {
                    debug!(pmid, "Nothing to delete");
                }
                tx.commit().await?;
            }
            Ok(deleted)
        }
    }
}

/// Lazily hydrates the selected citations in ascending PMID order.
///
/// `AllRecords` pages through identifiers `QUERY_LIMIT` at a time and loads
/// one graph at a time, so memory use does not grow with the store.
pub fn select(store: &Store, selection: Selection) -> BoxStream<'_, Result<Citation>> {
    match selection {
        Selection::ByIdentifiers(pmids) => stream::iter(pmids)
            .then(move |pmid| store.load(pmid))
            .filter_map(|loaded| async move { loaded.transpose() })
            .boxed(),
        Selection::AllRecords => stream::try_unfold(PageState::default(), move |state| {
            next_in_page(store, state)
        })
        .boxed(),
    }
}

#[derive(Default)]
struct PageState {
    after: Option<Pmid>,
    page: VecDeque<Pmid>,
    exhausted: bool,
}

async fn next_in_page(store: &Store, mut state: PageState) -> Result<Option<(Citation, PageState)>> {
    loop {
        if let Some(pmid) = state.page.pop_front() {
            match store.load(pmid).await? {
                Some(citation) => return Ok(Some((citation, state))),
                // removed between paging and hydration
                None => continue,
            }
        }
        if state.exhausted {
            return Ok(None);
        }
        let next = store.pmids_after(state.after, QUERY_LIMIT).await?;
        state.exhausted = next.len() < QUERY_LIMIT;
        state.after = next.last().copied().or(state.after);
        state.page.extend(next);
    }
}

/// Reads a deletion list: one PMID per line, blank lines ignored.
pub fn read_pmid_list(path: &Path) -> Result<Vec<Pmid>> {
    let content = fs::read_to_string(path).map_err(|source| Error::File {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .lines()
        .enumerate()
        .map(|(n, line)| (n, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            line.parse::<Pmid>()
                .ok()
                .filter(|&pmid| pmid > 0)
                .ok_or_else(|| Error::File {
                    path: path.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line {}: not a PMID: {:?}", n + 1, line),
                    ),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::collections::BTreeSet;

    #[test]
    fn reads_pmid_lists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("delete.txt");
        fs::write(&path, "12\n\n 34 \n").unwrap();
        assert_eq!(read_pmid_list(&path).unwrap(), vec![12, 34]);

        fs::write(&path, "12\nabc\n").unwrap();
        let err = read_pmid_list(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn select_on_empty_store() {
        let store = Store::open("sqlite::memory:").await.unwrap();
        let all: Vec<_> = select(&store, Selection::AllRecords)
            .try_collect()
            .await
            .unwrap();
        assert!(all.is_empty());
        let some: Vec<_> = select(&store, Selection::ByIdentifiers(BTreeSet::from([1, 2])))
            .try_collect()
            .await
            .unwrap();
        assert!(some.is_empty());
        assert_eq!(delete(&store, Selection::AllRecords).await.unwrap(), 0);
    }
}
