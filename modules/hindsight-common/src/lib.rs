pub mod config;
pub mod error;
pub mod surt;
pub mod types;
pub mod urlnorm;

pub use config::Config;
pub use error::{HindsightError, Result};
pub use types::{ArchiveSource, DateRange, FetchResult, Snapshot};
pub use urlnorm::{host_of, normalize_domain, normalize_url};
