use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::CollectionReport;

/// A domain collector: fetches targets from its providers, normalizes the
/// payloads and writes canonical records.
///
/// `collect` never fails as a whole; every problem is recorded against the
/// target it happened on.
#[async_trait]
pub trait Collector: Send + Sync {
    fn id(&self) -> &str;

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport;
}
