//! Target-set resolvers: what a job collects on each run.

use async_trait::async_trait;

use crate::errors::Result;

/// Produces the targets for one run. Resolved at dispatch time so watchlist
/// changes apply to the next run.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self) -> Result<Vec<String>>;
}

/// A fixed list from static configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticTargets(Vec<String>);

impl StaticTargets {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        Self(
            targets
                .into_iter()
                .map(Into::into)
                .map(|t: String| t.trim().to_string())
                .filter(|t| !t.is_empty() && seen.insert(t.clone()))
                .collect(),
        )
    }

    pub fn targets(&self) -> &[String] {
        &self.0
    }
}

#[async_trait]
impl TargetResolver for StaticTargets {
    async fn resolve(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_targets_trim_and_dedupe() {
        let targets = StaticTargets::new(["AAPL", " MSFT ", "", "AAPL"]);
        assert_eq!(targets.resolve().await.unwrap(), vec!["AAPL", "MSFT"]);
    }
}
