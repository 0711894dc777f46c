/// Discovery sources, one module per category. Each producer pushes
/// `DiscoveredUrl`s into the shared channel as it finds them and returns
/// its count; failures surface as a per-source error, never a panic of
/// the whole mapping run.
pub mod archives;
pub mod backlinks;
pub mod search_engines;
pub mod sitemaps;
pub mod subdomains;

use crate::model::DiscoveredUrl;

/// Messages flowing from producers to the merge loop. Completion and
/// failure travel in-band so the batch API can report per-source stats.
#[derive(Debug)]
pub(crate) enum ProducerMsg {
    Url(DiscoveredUrl),
    Done { source: &'static str, count: usize },
    Failed { source: &'static str, error: String },
}

pub(crate) type Tx = tokio::sync::mpsc::Sender<ProducerMsg>;

/// Send one discovery; false when the consumer has gone away and the
/// producer should stop.
pub(crate) async fn emit(tx: &Tx, url: DiscoveredUrl) -> bool {
    tx.send(ProducerMsg::Url(url)).await.is_ok()
}
