use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::config::StatsConfig;
use crate::fetch::PageSource;

/// How non-topic entries at the end of the index are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicTrim {
    /// Drop this many entries from the end, regardless of their names.
    DropTrailing(usize),
    /// Drop every entry whose name is listed.
    Exclude(Vec<String>),
}

impl TopicTrim {
    pub fn from_config(config: &StatsConfig) -> Self {
        if config.proposals.exclude_topics.is_empty() {
            Self::DropTrailing(config.trailing_entries())
        } else {
            Self::Exclude(config.proposals.exclude_topics.clone())
        }
    }

    pub fn apply(&self, mut topics: Vec<String>) -> Vec<String> {
        match self {
            Self::DropTrailing(count) => {
                if topics.len() < *count {
                    warn!(
                        found = topics.len(),
                        expected_at_least = *count,
                        "index page listed fewer entries than the trailing entries to drop"
                    );
                }
                topics.truncate(topics.len().saturating_sub(*count));
                topics
            }
            Self::Exclude(names) => topics
                .into_iter()
                .filter(|topic| !names.iter().any(|name| name == topic))
                .collect(),
        }
    }
}

/// Every `<prefix>/NAME|` occurrence in `index_text`, in order, duplicates kept.
pub fn extract_topic_candidates(index_text: &str, prefix: &str) -> Result<Vec<String>> {
    let pattern = format!(r"{}/(.*?)\|", regex::escape(prefix));
    let matcher =
        Regex::new(&pattern).with_context(|| format!("invalid topic pattern for {prefix}"))?;
    Ok(matcher
        .captures_iter(index_text)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .collect())
}

pub fn discover_topics<S: PageSource>(source: &mut S, config: &StatsConfig) -> Result<Vec<String>> {
    let index_title = config.index_title();
    let index_text = source
        .fetch_page(index_title)
        .with_context(|| format!("failed to load proposal index {index_title}"))?;
    let candidates = extract_topic_candidates(&index_text, config.topic_prefix())?;
    Ok(TopicTrim::from_config(config).apply(candidates))
}
