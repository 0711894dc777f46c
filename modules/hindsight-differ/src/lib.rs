pub mod content;
pub mod differ;
pub mod model;
pub mod timeline;

pub use content::{classify, compare_texts, content_hash, ChangeKind, TextComparison};
pub use differ::{ChangeMode, DifferConfig, DomainDiffer};
pub use model::{
    ContentAppearance, DomainChange, DomainEvolution, DomainSnapshotAt, PageChange, PageHistory,
    PageVersion, PeriodComparison, PeriodSummary,
};
pub use timeline::{
    build_timeline, detect_changes, diff_versions, find_first_appearance, find_last_appearance,
    Appearance, DigestChange, TimelineEntry, VersionDiff,
};
