use std::collections::{BTreeMap, VecDeque};

use anyhow::{Result, bail};

use crate::fetch::PageSource;
use crate::normalize::Clarifier;

#[derive(Debug, Default)]
pub(crate) struct MockSource {
    pages: BTreeMap<String, String>,
    requested: Vec<String>,
}

impl MockSource {
    pub(crate) fn with_page(mut self, title: &str, body: &str) -> Self {
        self.pages.insert(title.to_string(), body.to_string());
        self
    }

    pub(crate) fn requested(&self) -> &[String] {
        &self.requested
    }
}

impl PageSource for MockSource {
    fn fetch_page(&mut self, title: &str) -> Result<String> {
        self.requested.push(title.to_string());
        match self.pages.get(title) {
            Some(body) => Ok(body.clone()),
            None => bail!("fetching {title} failed with HTTP 404 Not Found"),
        }
    }

    fn request_count(&self) -> usize {
        self.requested.len()
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedClarifier {
    replies: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedClarifier {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(ToString::to_string).collect(),
            asked: Vec::new(),
        }
    }

    pub(crate) fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Clarifier for ScriptedClarifier {
    fn clarify(&mut self, raw: &str) -> Result<String> {
        self.asked.push(raw.to_string());
        match self.replies.pop_front() {
            Some(reply) => Ok(reply),
            None => bail!("no scripted reply left for \"{raw}\""),
        }
    }
}
