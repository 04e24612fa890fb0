use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::config::{DISCARD_SENTINEL, StatsConfig};

/// Ordered vocabulary of accepted data types. Order is the report row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KnownTypes {
    types: Vec<String>,
}

impl KnownTypes {
    pub fn new<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            types: types
                .into_iter()
                .map(|value| normalize_type(value.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::new(config.known_types())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.types.iter().any(|known| known == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum Resolution {
    Known(String),
    Discard,
}

/// One operator answer: the string that was shown and the reply given for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clarification {
    pub raw: String,
    pub reply: String,
}

impl Clarification {
    pub fn is_discard(&self) -> bool {
        self.reply.eq_ignore_ascii_case(DISCARD_SENTINEL)
    }
}

/// Source of replacements for type strings outside the vocabulary.
pub trait Clarifier {
    fn clarify(&mut self, raw: &str) -> Result<String>;
}

/// Prompts on `output` and reads one line per question from `input`.
pub struct PromptClarifier<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptClarifier<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Clarifier for PromptClarifier<R, W> {
    fn clarify(&mut self, raw: &str) -> Result<String> {
        writeln!(
            self.output,
            "clarify type (\"{DISCARD_SENTINEL}\" to ignore): \"{raw}\""
        )
        .context("failed to write clarification prompt")?;
        self.output
            .flush()
            .context("failed to flush clarification prompt")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read clarification reply")?;
        if read == 0 {
            bail!("input closed while clarifying type \"{raw}\"");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Discards every unrecognized type without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipAllClarifier;

impl Clarifier for SkipAllClarifier {
    fn clarify(&mut self, _raw: &str) -> Result<String> {
        Ok(DISCARD_SENTINEL.to_string())
    }
}

pub fn normalize_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub struct TypeNormalizer {
    known: KnownTypes,
    aliases: BTreeMap<String, String>,
    cache_enabled: bool,
    cache: HashMap<String, Resolution>,
    history: Vec<Clarification>,
}

impl TypeNormalizer {
    pub fn new(known: KnownTypes) -> Self {
        Self {
            known,
            aliases: BTreeMap::new(),
            cache_enabled: true,
            cache: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::new(KnownTypes::from_config(config))
            .with_aliases(config.aliases())
            .with_cache(config.cache_clarifications())
    }

    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// When disabled, every occurrence of an unrecognized value is asked about again.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn known_types(&self) -> &KnownTypes {
        &self.known
    }

    pub fn resolve<C: Clarifier + ?Sized>(
        &mut self,
        raw: &str,
        clarifier: &mut C,
    ) -> Result<Resolution> {
        let normalized = normalize_type(raw);
        if self.known.contains(&normalized) {
            return Ok(Resolution::Known(normalized));
        }
        if self.cache_enabled
            && let Some(cached) = self.cache.get(&normalized)
        {
            return Ok(cached.clone());
        }

        let resolution = self.clarify_until_known(&normalized, clarifier)?;
        if self.cache_enabled {
            self.cache.insert(normalized, resolution.clone());
        }
        Ok(resolution)
    }

    fn clarify_until_known<C: Clarifier + ?Sized>(
        &mut self,
        normalized: &str,
        clarifier: &mut C,
    ) -> Result<Resolution> {
        let mut current = normalized.to_string();
        if let Some(target) = self.aliases.get(&current) {
            if target == DISCARD_SENTINEL {
                return Ok(Resolution::Discard);
            }
            current = target.clone();
        }

        while !self.known.contains(&current) {
            let reply = clarifier.clarify(&current)?;
            let reply = reply.trim();
            self.record(&current, reply);
            if reply.eq_ignore_ascii_case(DISCARD_SENTINEL) {
                return Ok(Resolution::Discard);
            }
            current = normalize_type(reply);
        }
        Ok(Resolution::Known(current))
    }

    fn record(&mut self, raw: &str, reply: &str) {
        match self.history.iter_mut().find(|entry| entry.raw == raw) {
            Some(entry) => entry.reply = reply.to_string(),
            None => self.history.push(Clarification {
                raw: raw.to_string(),
                reply: reply.to_string(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> &[Clarification] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Clarification> {
        self.history
    }
}
