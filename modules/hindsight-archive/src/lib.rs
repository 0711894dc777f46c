pub mod adapter;
pub mod ga;
pub mod orchestrator;
pub mod search;
mod sources;
pub mod text_extract;

pub use adapter::SourceAdapter;
pub use hindsight_common::{ArchiveSource, DateRange, FetchResult, HindsightError, Result, Snapshot};
pub use orchestrator::{Hindsight, HindsightConfig, RaceMode};
pub use search::{
    ArchiveEvent, ArchiveSearcher, Channel, Direction, SearchConfig, SearchHit, SearchRequest,
    SearchSource, StatusEvent,
};
pub use sources::cc_index::{CcIndex, CcIndexConfig, IndexRecord};
pub use sources::cc_warc::{CcWarcFetcher, WarcPage};
pub use sources::cc_wat::CcLinksExtractor;
pub use sources::es_bridge::{EsBridge, LinkDirection};
pub use sources::exa::ExaAdapter;
pub use sources::firecrawl::FirecrawlAdapter;
pub use sources::memento::{ArchiveComparison, Memento};
pub use sources::wayback::{CdxRow, ClosestSnapshot, SaveReceipt, Wayback};
