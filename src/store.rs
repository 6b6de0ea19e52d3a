//! SQLite storage for citation graphs.
//!
//! The store owns the schema, the connection pool and transactions. It only
//! offers primitive graph operations; `crud` composes them into the
//! create/upsert/delete/select contract.

use crate::config::{DOI_NAMESPACE, QUERY_LIMIT};
use crate::error::Result;
use crate::models::{
    Abstract, Author, Chemical, Citation, Database, Descriptor, Identifier, Keyword, Pmid,
    Qualifier, Section,
};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS citations (
        pmid INTEGER PRIMARY KEY CHECK (pmid > 0),
        status TEXT NOT NULL,
        year INTEGER NOT NULL,
        title TEXT NOT NULL CHECK (title <> ''),
        journal TEXT NOT NULL,
        pub_date TEXT NOT NULL,
        issue TEXT,
        pagination TEXT,
        created DATE NOT NULL,
        completed DATE,
        revised DATE,
        modified DATE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS abstracts (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        source TEXT NOT NULL,
        copyright TEXT,
        PRIMARY KEY (pmid, source)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sections (
        pmid INTEGER NOT NULL,
        source TEXT NOT NULL,
        seq INTEGER NOT NULL CHECK (seq > 0),
        name TEXT NOT NULL,
        label TEXT,
        content TEXT NOT NULL,
        truncated BOOLEAN NOT NULL DEFAULT 0,
        PRIMARY KEY (pmid, source, seq),
        FOREIGN KEY (pmid, source) REFERENCES abstracts (pmid, source) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        pos INTEGER NOT NULL CHECK (pos > 0),
        name TEXT NOT NULL,
        initials TEXT,
        forename TEXT,
        suffix TEXT,
        PRIMARY KEY (pmid, pos)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS descriptors (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        num INTEGER NOT NULL CHECK (num > 0),
        major BOOLEAN NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (pmid, num)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qualifiers (
        pmid INTEGER NOT NULL,
        num INTEGER NOT NULL,
        sub INTEGER NOT NULL CHECK (sub > 0),
        major BOOLEAN NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (pmid, num, sub),
        FOREIGN KEY (pmid, num) REFERENCES descriptors (pmid, num) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS identifiers (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        namespace TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (pmid, namespace)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS identifiers_namespace_value_idx ON identifiers (namespace, value)",
    r#"
    CREATE TABLE IF NOT EXISTS databases (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        name TEXT NOT NULL,
        accession TEXT NOT NULL,
        PRIMARY KEY (pmid, name, accession)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS publication_types (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        value TEXT NOT NULL,
        PRIMARY KEY (pmid, value)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chemicals (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        idx INTEGER NOT NULL CHECK (idx > 0),
        uid TEXT,
        name TEXT NOT NULL,
        PRIMARY KEY (pmid, idx)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS keywords (
        pmid INTEGER NOT NULL REFERENCES citations (pmid) ON DELETE CASCADE,
        owner TEXT NOT NULL,
        cnt INTEGER NOT NULL CHECK (cnt > 0),
        major BOOLEAN NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (pmid, owner, cnt)
    )
    "#,
];

/// Child tables, dependents first, so deletes never trip a foreign key.
const CHILD_TABLES: [&str; 10] = [
    "sections",
    "abstracts",
    "qualifiers",
    "descriptors",
    "authors",
    "identifiers",
    "databases",
    "publication_types",
    "chemicals",
    "keywords",
];

type CitationRow = (
    i64,
    String,
    i32,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    NaiveDate,
    Option<NaiveDate>,
    Option<NaiveDate>,
    NaiveDate,
);

/// Handle on an open store; pass it explicitly to every operation.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connects to `url` (e.g. `sqlite://medline.db` or `sqlite::memory:`),
    /// creating the database file and schema if missing.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // one long-lived connection keeps in-memory databases alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!(url, "Opened citation store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!("Closed citation store");
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn exists(&self, pmid: Pmid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM citations WHERE pmid = ?)")
            .bind(i64::from(pmid))
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM citations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Up to `limit` stored PMIDs greater than `after`, ascending.
    pub async fn pmids_after(&self, after: Option<Pmid>, limit: usize) -> Result<Vec<Pmid>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT pmid FROM citations WHERE pmid > ? ORDER BY pmid LIMIT ?")
                .bind(after.map_or(0, i64::from))
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(pmid,)| pmid as Pmid).collect())
    }

    /// The subset of `pmids` that is stored.
    pub async fn existing(&self, pmids: &[Pmid]) -> Result<BTreeSet<Pmid>> {
        self.stored_among(pmids, None).await
    }

    /// The subset of `pmids` that is not stored.
    pub async fn missing(&self, pmids: &[Pmid]) -> Result<BTreeSet<Pmid>> {
        let existing = self.existing(pmids).await?;
        Ok(pmids
            .iter()
            .copied()
            .filter(|pmid| !existing.contains(pmid))
            .collect())
    }

    /// The subset of `pmids` last modified strictly before `before`.
    pub async fn modified_before(
        &self,
        pmids: &[Pmid],
        before: NaiveDate,
    ) -> Result<BTreeSet<Pmid>> {
        self.stored_among(pmids, Some(before)).await
    }

    async fn stored_among(
        &self,
        pmids: &[Pmid],
        before: Option<NaiveDate>,
    ) -> Result<BTreeSet<Pmid>> {
        let mut found = BTreeSet::new();
        // one bind is reserved for the date
        for chunk in pmids.chunks(QUERY_LIMIT - 1) {
            let mut query = QueryBuilder::<Sqlite>::new("SELECT pmid FROM citations WHERE ");
            if let Some(before) = before {
                query.push("modified < ").push_bind(before).push(" AND ");
            }
            query.push("pmid IN (");
            let mut list = query.separated(", ");
            for pmid in chunk {
                list.push_bind(i64::from(*pmid));
            }
            list.push_unseparated(")");
            let rows: Vec<(i64,)> = query.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows.into_iter().map(|(pmid,)| pmid as Pmid));
        }
        Ok(found)
    }

    /// DOI of `pmid`, if one is stored.
    pub async fn pmid_to_doi(&self, pmid: Pmid) -> Result<Option<String>> {
        let doi = sqlx::query_scalar(
            "SELECT value FROM identifiers WHERE namespace = ? AND pmid = ?",
        )
        .bind(DOI_NAMESPACE)
        .bind(i64::from(pmid))
        .fetch_optional(&self.pool)
        .await?;
        Ok(doi)
    }

    /// Lowest PMID stored under `doi`.
    pub async fn doi_to_pmid(&self, doi: &str) -> Result<Option<Pmid>> {
        let pmid: Option<i64> = sqlx::query_scalar(
            "SELECT pmid FROM identifiers WHERE namespace = ? AND value = ? ORDER BY pmid LIMIT 1",
        )
        .bind(DOI_NAMESPACE)
        .bind(doi)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pmid.map(|pmid| pmid as Pmid))
    }

    /// DOIs of those `pmids` that have one; the rest are left out.
    pub async fn map_pmids_to_dois(&self, pmids: &[Pmid]) -> Result<BTreeMap<Pmid, String>> {
        let mut mapping = BTreeMap::new();
        for chunk in pmids.chunks(QUERY_LIMIT - 1) {
            let mut query =
                QueryBuilder::<Sqlite>::new("SELECT pmid, value FROM identifiers WHERE namespace = ");
            query.push_bind(DOI_NAMESPACE).push(" AND pmid IN (");
            let mut list = query.separated(", ");
            for pmid in chunk {
                list.push_bind(i64::from(*pmid));
            }
            list.push_unseparated(")");
            let rows: Vec<(i64, String)> = query.build_query_as().fetch_all(&self.pool).await?;
            mapping.extend(rows.into_iter().map(|(pmid, doi)| (pmid as Pmid, doi)));
        }
        Ok(mapping)
    }

    /// PMIDs of those `dois` that are stored; a DOI shared by several
    /// citations maps to the lowest PMID.
    pub async fn map_dois_to_pmids<S: AsRef<str>>(
        &self,
        dois: &[S],
    ) -> Result<BTreeMap<String, Pmid>> {
        let mut mapping = BTreeMap::new();
        for chunk in dois.chunks(QUERY_LIMIT - 1) {
            let mut query =
                QueryBuilder::<Sqlite>::new("SELECT value, pmid FROM identifiers WHERE namespace = ");
            query.push_bind(DOI_NAMESPACE).push(" AND value IN (");
            let mut list = query.separated(", ");
            for doi in chunk {
                list.push_bind(doi.as_ref().to_string());
            }
            list.push_unseparated(") ORDER BY pmid DESC");
            let rows: Vec<(String, i64)> = query.build_query_as().fetch_all(&self.pool).await?;
            mapping.extend(rows.into_iter().map(|(doi, pmid)| (doi, pmid as Pmid)));
        }
        Ok(mapping)
    }

    /// Hydrates the complete graph of one citation.
    pub async fn load(&self, pmid: Pmid) -> Result<Option<Citation>> {
        let mut conn = self.pool.acquire().await?;
        let key = i64::from(pmid);

        let row: Option<CitationRow> = sqlx::query_as(
            "SELECT pmid, status, year, title, journal, pub_date, issue, pagination, \
             created, completed, revised, modified FROM citations WHERE pmid = ?",
        )
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
        let Some((
            _,
            status,
            year,
            title,
            journal,
            pub_date,
            issue,
            pagination,
            created,
            completed,
            revised,
            modified,
        )) = row
        else {
            return Ok(None);
        };

        let abstract_rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT source, copyright FROM abstracts WHERE pmid = ? ORDER BY rowid")
                .bind(key)
                .fetch_all(&mut *conn)
                .await?;
        let section_rows: Vec<(String, i64, String, Option<String>, String, bool)> = sqlx::query_as(
            "SELECT source, seq, name, label, content, truncated FROM sections \
             WHERE pmid = ? ORDER BY source, seq",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?;
        let mut abstracts: Vec<Abstract> = abstract_rows
            .into_iter()
            .map(|(source, copyright)| Abstract {
                source,
                copyright,
                sections: Vec::new(),
            })
            .collect();
        for (source, seq, name, label, content, truncated) in section_rows {
            if let Some(a) = abstracts.iter_mut().find(|a| a.source == source) {
                a.sections.push(Section {
                    seq: seq as u16,
                    name,
                    label,
                    content,
                    truncated,
                });
            }
        }

        let authors = sqlx::query_as::<_, (i64, String, Option<String>, Option<String>, Option<String>)>(
            "SELECT pos, name, initials, forename, suffix FROM authors WHERE pmid = ? ORDER BY pos",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(pos, name, initials, forename, suffix)| Author {
            pos: pos as u16,
            name,
            initials,
            forename,
            suffix,
        })
        .collect();

        let publication_types = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM publication_types WHERE pmid = ? ORDER BY rowid",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(value,)| value)
        .collect();

        let descriptor_rows: Vec<(i64, bool, String)> =
            sqlx::query_as("SELECT num, major, name FROM descriptors WHERE pmid = ? ORDER BY num")
                .bind(key)
                .fetch_all(&mut *conn)
                .await?;
        let qualifier_rows: Vec<(i64, i64, bool, String)> = sqlx::query_as(
            "SELECT num, sub, major, name FROM qualifiers WHERE pmid = ? ORDER BY num, sub",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?;
        let mut descriptors: Vec<Descriptor> = descriptor_rows
            .into_iter()
            .map(|(num, major, name)| Descriptor {
                num: num as u16,
                name,
                major,
                qualifiers: Vec::new(),
            })
            .collect();
        for (num, sub, major, name) in qualifier_rows {
            if let Some(d) = descriptors.iter_mut().find(|d| i64::from(d.num) == num) {
                d.qualifiers.push(Qualifier {
                    sub: sub as u16,
                    name,
                    major,
                });
            }
        }

        let identifiers = sqlx::query_as::<_, (String, String)>(
            "SELECT namespace, value FROM identifiers WHERE pmid = ? ORDER BY rowid",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(namespace, value)| Identifier { namespace, value })
        .collect();

        let databases = sqlx::query_as::<_, (String, String)>(
            "SELECT name, accession FROM databases WHERE pmid = ? ORDER BY rowid",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(name, accession)| Database { name, accession })
        .collect();

        let chemicals = sqlx::query_as::<_, (i64, Option<String>, String)>(
            "SELECT idx, uid, name FROM chemicals WHERE pmid = ? ORDER BY idx",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(idx, uid, name)| Chemical {
            idx: idx as u16,
            uid,
            name,
        })
        .collect();

        let keywords = sqlx::query_as::<_, (String, i64, bool, String)>(
            "SELECT owner, cnt, major, name FROM keywords WHERE pmid = ? ORDER BY rowid",
        )
        .bind(key)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(owner, cnt, major, name)| Keyword {
            owner,
            cnt: cnt as u16,
            name,
            major,
        })
        .collect();

        Ok(Some(Citation {
            pmid,
            status,
            title,
            journal,
            pub_date,
            year,
            issue,
            pagination,
            created,
            completed,
            revised,
            modified: Some(modified),
            abstracts,
            authors,
            publication_types,
            descriptors,
            identifiers,
            databases,
            chemicals,
            keywords,
        }))
    }
}

/// Inserts every row of `c`, stamping `modified`.
pub async fn insert_graph(
    tx: &mut Transaction<'_, Sqlite>,
    c: &Citation,
    modified: NaiveDate,
) -> Result<()> {
    let key = i64::from(c.pmid);

    sqlx::query(
        "INSERT INTO citations (pmid, status, year, title, journal, pub_date, issue, \
         pagination, created, completed, revised, modified) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(key)
    .bind(&c.status)
    .bind(c.year)
    .bind(&c.title)
    .bind(&c.journal)
    .bind(&c.pub_date)
    .bind(c.issue.as_deref())
    .bind(c.pagination.as_deref())
    .bind(c.created)
    .bind(c.completed)
    .bind(c.revised)
    .bind(modified)
    .execute(&mut **tx)
    .await?;

    for a in &c.abstracts {
        sqlx::query("INSERT INTO abstracts (pmid, source, copyright) VALUES (?, ?, ?)")
            .bind(key)
            .bind(&a.source)
            .bind(a.copyright.as_deref())
            .execute(&mut **tx)
            .await?;
        for s in &a.sections {
            sqlx::query(
                "INSERT INTO sections (pmid, source, seq, name, label, content, truncated) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(key)
            .bind(&a.source)
            .bind(i64::from(s.seq))
            .bind(&s.name)
            .bind(s.label.as_deref())
            .bind(&s.content)
            .bind(s.truncated)
            .execute(&mut **tx)
            .await?;
        }
    }

    for a in &c.authors {
        sqlx::query(
            "INSERT INTO authors (pmid, pos, name, initials, forename, suffix) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(i64::from(a.pos))
        .bind(&a.name)
        .bind(a.initials.as_deref())
        .bind(a.forename.as_deref())
        .bind(a.suffix.as_deref())
        .execute(&mut **tx)
        .await?;
    }

    for value in &c.publication_types {
        sqlx::query("INSERT INTO publication_types (pmid, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut **tx)
            .await?;
    }

    for d in &c.descriptors {
        sqlx::query("INSERT INTO descriptors (pmid, num, major, name) VALUES (?, ?, ?, ?)")
            .bind(key)
            .bind(i64::from(d.num))
            .bind(d.major)
            .bind(&d.name)
            .execute(&mut **tx)
            .await?;
        for q in &d.qualifiers {
            sqlx::query(
                "INSERT INTO qualifiers (pmid, num, sub, major, name) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(key)
            .bind(i64::from(d.num))
            .bind(i64::from(q.sub))
            .bind(q.major)
            .bind(&q.name)
            .execute(&mut **tx)
            .await?;
        }
    }

    for i in &c.identifiers {
        sqlx::query("INSERT INTO identifiers (pmid, namespace, value) VALUES (?, ?, ?)")
            .bind(key)
            .bind(&i.namespace)
            .bind(&i.value)
            .execute(&mut **tx)
            .await?;
    }

    for db in &c.databases {
        sqlx::query("INSERT INTO databases (pmid, name, accession) VALUES (?, ?, ?)")
            .bind(key)
            .bind(&db.name)
            .bind(&db.accession)
            .execute(&mut **tx)
            .await?;
    }

    for chem in &c.chemicals {
        sqlx::query("INSERT INTO chemicals (pmid, idx, uid, name) VALUES (?, ?, ?, ?)")
            .bind(key)
            .bind(i64::from(chem.idx))
            .bind(chem.uid.as_deref())
            .bind(&chem.name)
            .execute(&mut **tx)
            .await?;
    }

    for k in &c.keywords {
        sqlx::query("INSERT INTO keywords (pmid, owner, cnt, major, name) VALUES (?, ?, ?, ?, ?)")
            .bind(key)
            .bind(&k.owner)
            .bind(i64::from(k.cnt))
            .bind(k.major)
            .bind(&k.name)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Removes the graph of `pmid`; `false` if nothing was stored.
pub async fn delete_graph(tx: &mut Transaction<'_, Sqlite>, pmid: Pmid) -> Result<bool> {
    let key = i64::from(pmid);
    for table in CHILD_TABLES {
        sqlx::query(&format!("DELETE FROM {table} WHERE pmid = ?"))
            .bind(key)
            .execute(&mut **tx)
            .await?;
    }
    let deleted = sqlx::query("DELETE FROM citations WHERE pmid = ?")
        .bind(key)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}

/// Empties every table; returns the number of citations removed.
pub async fn delete_all(tx: &mut Transaction<'_, Sqlite>) -> Result<u64> {
    for table in CHILD_TABLES {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut **tx)
            .await?;
    }
    let deleted = sqlx::query("DELETE FROM citations")
        .execute(&mut **tx)
        .await?
        .rows_affected();
    Ok(deleted)
}
