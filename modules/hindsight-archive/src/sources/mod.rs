/// Source adapters: pure I/O against one external archive service each.
/// Adapters swallow transient failures (empty result + debug log) and only
/// surface precondition violations to callers.
pub(crate) mod cc_index;
pub(crate) mod cc_warc;
pub(crate) mod cc_wat;
pub(crate) mod es_bridge;
pub(crate) mod exa;
pub(crate) mod firecrawl;
pub(crate) mod memento;
pub(crate) mod wayback;
