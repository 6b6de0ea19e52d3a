use crate::config::{EUTILS_URL, FETCH_SIZE, FETCH_TIMEOUT_SECS};
use crate::error::Result;
use crate::models::Pmid;
use crate::stream::Source;
use std::time::Duration;
use tracing::info;

/// Downloads MEDLINE XML records from NCBI eUtils efetch.
pub struct EutilsClient {
    client: reqwest::Client,
    base_url: String,
}

impl EutilsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(EUTILS_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(concat!("medic/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetches one batch of at most `FETCH_SIZE` records as raw XML.
    pub async fn fetch(&self, pmids: &[Pmid]) -> Result<Vec<u8>> {
        debug_assert!(pmids.len() <= FETCH_SIZE, "too many PMIDs for one request");
        let url = efetch_url(&self.base_url, pmids);
        info!(count = pmids.len(), "Fetching MEDLINE records from eUtils");
        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetches any number of records, one in-memory source per batch.
    pub async fn fetch_sources(&self, pmids: &[Pmid]) -> Result<Vec<Source>> {
        let mut sources = Vec::with_capacity(pmids.len().div_ceil(FETCH_SIZE));
        for (n, batch) in pmids.chunks(FETCH_SIZE).enumerate() {
            let bytes = self.fetch(batch).await?;
            sources.push(Source::Memory {
                name: format!("eutils batch {}", n + 1),
                bytes,
            });
        }
        Ok(sources)
    }
}

fn efetch_url(base_url: &str, pmids: &[Pmid]) -> String {
    let ids = pmids
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{base_url}?tool=medic&db=pubmed&retmode=xml&rettype=medline&id={ids}")
}
