//! Per-source caches merged into one newest-first view.

use domain::services::{merge_newest_first, Timeline};
use tokio::sync::mpsc;
use tracing::trace;

use super::Publisher;

/// One cache slice per source, replaced whole on every update.
#[derive(Debug)]
pub struct Aggregator<T> {
    slices: Vec<(String, Vec<T>)>,
}

impl<T> Default for Aggregator<T> {
    fn default() -> Self {
        Self { slices: Vec::new() }
    }
}

impl<T: Timeline + Clone> Aggregator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slice of `source` and returns the merged view.
    pub fn replace(&mut self, source: &str, items: Vec<T>) -> Vec<T> {
        match self.slices.iter_mut().find(|(name, _)| name == source) {
            Some((_, slice)) => *slice = items,
            None => self.slices.push((source.to_string(), items)),
        }
        self.merged()
    }

    pub fn remove(&mut self, source: &str) {
        self.slices.retain(|(name, _)| name != source);
    }

    /// Slices concatenated in source registration order, de-duplicated with
    /// the first occurrence kept, newest first.
    pub fn merged(&self) -> Vec<T> {
        merge_newest_first(
            self.slices
                .iter()
                .flat_map(|(_, slice)| slice.iter().cloned()),
        )
    }

    pub fn sources(&self) -> usize {
        self.slices.len()
    }
}

/// Latest result set of one source.
#[derive(Debug)]
pub(crate) struct SourceUpdate<T> {
    pub source: String,
    pub items: Vec<T>,
}

pub(crate) type SourceSender<T> = mpsc::UnboundedSender<SourceUpdate<T>>;

/// Spawns the task that folds source updates into the published view.
pub(crate) fn spawn_merge<T>(publisher: Publisher<T>) -> SourceSender<T>
where
    T: Timeline + Clone + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<SourceUpdate<T>>();
    tokio::spawn(async move {
        let mut aggregator = Aggregator::new();
        loop {
            let update = tokio::select! {
                _ = publisher.token().cancelled() => break,
                update = rx.recv() => update,
            };
            let Some(update) = update else { break };
            let merged = aggregator.replace(&update.source, update.items);
            trace!(source = %update.source, count = merged.len(), "Merged live update");
            if !publisher.publish(merged) {
                break;
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str, i64);

    impl Timeline for Item {
        fn key(&self) -> &str {
            self.0
        }

        fn instant(&self) -> Option<DateTime<Utc>> {
            Utc.timestamp_opt(self.1, 0).single()
        }
    }

    fn keys(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.0).collect()
    }

    #[test]
    fn test_merge_sorts_across_sources() {
        let mut agg = Aggregator::new();
        agg.replace("circle", vec![Item("t2", 20), Item("t3", 10)]);
        let merged = agg.replace("smartwatch", vec![Item("t1", 30)]);
        assert_eq!(keys(&merged), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_replace_is_last_write_wins() {
        let mut agg = Aggregator::new();
        agg.replace("g1", vec![Item("a", 1), Item("b", 2)]);
        let merged = agg.replace("g1", vec![Item("c", 3)]);
        assert_eq!(keys(&merged), vec!["c"]);
        assert_eq!(agg.sources(), 1);
    }

    #[test]
    fn test_duplicates_keep_first_source() {
        let mut agg = Aggregator::new();
        agg.replace("g1", vec![Item("a", 5)]);
        let merged = agg.replace("g2", vec![Item("a", 9), Item("b", 1)]);
        assert_eq!(merged, vec![Item("a", 5), Item("b", 1)]);

        agg.remove("g1");
        assert_eq!(agg.merged(), vec![Item("a", 9), Item("b", 1)]);
    }
}
