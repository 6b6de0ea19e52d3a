/// Title stored when neither ArticleTitle nor VernacularTitle has text
pub const UNKNOWN_TITLE: &str = "UNKNOWN";

/// Source tag of the main (non-Other) abstract
pub const NLM_SOURCE: &str = "NLM";

/// Identifier namespace reserved for PubMed Central references
pub const PMC_NAMESPACE: &str = "pmc";

/// Identifier namespace holding DOIs
pub const DOI_NAMESPACE: &str = "doi";

/// OtherID source whose PMC references become the `pmc` identifier
pub const PMC_OTHER_ID_SOURCE: &str = "NLM";

/// Publisher stub abstract that carries no content of its own
pub const PUBLISHER_STUB_ABSTRACT: &str = "Abstract available from the publisher.";

/// Forenames longer than this are cut (the store column is bounded)
pub const MAX_FORENAME_CHARS: usize = 256;

/// Page size for identifier scans and IN-list chunks against the store
pub const QUERY_LIMIT: usize = 999;

/// Maximum number of PMIDs per eUtils efetch request
pub const FETCH_SIZE: usize = 100;

/// Seconds to wait for an eUtils response
pub const FETCH_TIMEOUT_SECS: u64 = 60;

/// eUtils efetch endpoint for MEDLINE XML records
pub const EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

/// Default store location when neither --db nor MEDIC_DATABASE_URL is given
pub const DEFAULT_DATABASE_URL: &str = "sqlite://medline.db";

/// Buffer size for each per-table dump writer
pub const DUMP_BUFFER_SIZE: usize = 128 * 1024;

/// Progress update interval (tick every N citations)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Trailing marker NLM appends to abstracts cut at the word limit
pub const TRUNCATION_PATTERN: &str = r"\s*\(ABSTRACT TRUNCATED AT \d+ WORDS\)$";

/// A DOI-looking value: registrant prefix, slash, suffix
pub const DOI_PATTERN: &str = r"^\d[\d.]+/.+";
