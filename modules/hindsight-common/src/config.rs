use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
///
/// Every key is optional: adapters whose key is absent log once and act as
/// no-ops rather than failing.
#[derive(Debug, Clone)]
pub struct Config {
    // Elasticsearch (entity superindex)
    pub es_host: String,
    pub es_username: String,
    pub es_password: String,

    // Paid archive/scraping APIs
    pub firecrawl_api_key: String,
    pub exa_api_key: String,

    // Search engine discovery
    pub google_api_key: String,
    pub google_cse_id: String,
    pub serpapi_key: String,
    pub brave_api_key: String,

    // Backlink discovery
    pub majestic_api_key: String,

    // External binaries for WARC/WAT processing
    pub ccwarc_bin: String,
    pub cclinks_bin: String,

    /// Directory for the on-disk cluster index cache. Safe to delete.
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            es_host: env::var("ELASTICSEARCH_URL")
                .unwrap_or_else(|_| "http://localhost:9200".to_string()),
            es_username: env::var("ES_USERNAME").unwrap_or_default(),
            es_password: env::var("ES_PASSWORD").unwrap_or_default(),
            firecrawl_api_key: env::var("FIRECRAWL_API_KEY").unwrap_or_default(),
            exa_api_key: env::var("EXA_API_KEY").unwrap_or_default(),
            google_api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
            google_cse_id: env::var("GOOGLE_CSE_ID").unwrap_or_default(),
            serpapi_key: env::var("SERPAPI_KEY").unwrap_or_default(),
            brave_api_key: env::var("BRAVE_API_KEY").unwrap_or_default(),
            majestic_api_key: env::var("MAJESTIC_API_KEY").unwrap_or_default(),
            ccwarc_bin: env::var("CCWARC_BIN").unwrap_or_default(),
            cclinks_bin: env::var("CCLINKS_BIN").unwrap_or_default(),
            data_dir: env::var("HINDSIGHT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("hindsight")),
        }
    }

    /// Log presence and length of each sensitive value, never the value.
    pub fn log_redacted(&self) {
        let vars = [
            ("ELASTICSEARCH_URL", &self.es_host),
            ("ES_USERNAME", &self.es_username),
            ("ES_PASSWORD", &self.es_password),
            ("FIRECRAWL_API_KEY", &self.firecrawl_api_key),
            ("EXA_API_KEY", &self.exa_api_key),
            ("GOOGLE_API_KEY", &self.google_api_key),
            ("GOOGLE_CSE_ID", &self.google_cse_id),
            ("SERPAPI_KEY", &self.serpapi_key),
            ("BRAVE_API_KEY", &self.brave_api_key),
            ("MAJESTIC_API_KEY", &self.majestic_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}
