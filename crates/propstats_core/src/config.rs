use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://www.wikidata.org/w/api.php";
pub const DEFAULT_USER_AGENT: &str = "propstats/0.1";
pub const DEFAULT_INDEX_TITLE: &str = "Wikidata:Property_proposal";
pub const DEFAULT_TOPIC_PREFIX: &str = "Wikidata:Property proposal";
pub const DEFAULT_PAGE_PREFIX: &str = "Wikidata:Property_proposal";
pub const DEFAULT_TRAILING_ENTRIES: usize = 3;
pub const DEFAULT_CONFIG_FILENAME: &str = "propstats.toml";
pub const DISCARD_SENTINEL: &str = "skip";

pub const DEFAULT_KNOWN_TYPES: [&str; 9] = [
    "item",
    "string",
    "media",
    "coordinate",
    "monolingual text",
    "multilingual text",
    "time",
    "number",
    "url",
];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StatsConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub proposals: ProposalsSection,
    #[serde(default)]
    pub types: TypesSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ProposalsSection {
    pub index_title: Option<String>,
    pub topic_prefix: Option<String>,
    pub page_prefix: Option<String>,
    pub trailing_entries: Option<usize>,
    #[serde(default)]
    pub exclude_topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TypesSection {
    pub known: Option<Vec<String>>,
    pub cache_clarifications: Option<bool>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl StatsConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > DEFAULT_API_URL.
    pub fn api_url(&self) -> String {
        env_override("WIKI_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn index_title(&self) -> &str {
        self.proposals
            .index_title
            .as_deref()
            .unwrap_or(DEFAULT_INDEX_TITLE)
    }

    pub fn topic_prefix(&self) -> &str {
        self.proposals
            .topic_prefix
            .as_deref()
            .unwrap_or(DEFAULT_TOPIC_PREFIX)
    }

    pub fn page_prefix(&self) -> &str {
        self.proposals
            .page_prefix
            .as_deref()
            .unwrap_or(DEFAULT_PAGE_PREFIX)
    }

    /// Title of the proposal page for one topic, e.g. `Wikidata:Property_proposal/Sports`.
    pub fn proposal_page_title(&self, topic: &str) -> String {
        format!("{}/{}", self.page_prefix().trim_end_matches('/'), topic)
    }

    pub fn trailing_entries(&self) -> usize {
        self.proposals
            .trailing_entries
            .unwrap_or(DEFAULT_TRAILING_ENTRIES)
    }

    /// Known type vocabulary in report order, lower-cased and trimmed.
    pub fn known_types(&self) -> Vec<String> {
        match &self.types.known {
            Some(known) => known
                .iter()
                .map(|value| value.trim().to_lowercase())
                .collect(),
            None => DEFAULT_KNOWN_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    pub fn cache_clarifications(&self) -> bool {
        self.types.cache_clarifications.unwrap_or(true)
    }

    /// Aliases keyed by normalized raw value, targets normalized the same way.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.types
            .aliases
            .iter()
            .map(|(raw, target)| (raw.trim().to_lowercase(), target.trim().to_lowercase()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let known = self.known_types();
        if known.is_empty() {
            bail!("[types] known must list at least one type");
        }
        if let Some(empty) = known.iter().position(String::is_empty) {
            bail!("[types] known entry #{} is empty", empty + 1);
        }
        if known.iter().any(|value| value == DISCARD_SENTINEL) {
            bail!("[types] known cannot contain \"{DISCARD_SENTINEL}\", it is the discard reply");
        }
        for (index, value) in known.iter().enumerate() {
            if known[..index].contains(value) {
                bail!("[types] known lists \"{value}\" more than once");
            }
        }
        for (raw, target) in self.aliases() {
            if target != DISCARD_SENTINEL && !known.contains(&target) {
                bail!(
                    "[types.aliases] \"{raw}\" maps to \"{target}\", which is neither a known type nor \"{DISCARD_SENTINEL}\""
                );
            }
        }
        Ok(())
    }

    pub fn diagnostics(&self) -> String {
        let mut lines = vec![
            format!("api_url: {}", self.api_url()),
            format!("user_agent: {}", self.user_agent()),
            format!("index_title: {}", self.index_title()),
            format!("topic_prefix: {}", self.topic_prefix()),
            format!("page_prefix: {}", self.page_prefix()),
        ];
        if self.proposals.exclude_topics.is_empty() {
            lines.push(format!("trailing_entries: {}", self.trailing_entries()));
        } else {
            lines.push(format!(
                "exclude_topics: {}",
                self.proposals.exclude_topics.join(", ")
            ));
        }
        lines.push(format!("known_types: {}", self.known_types().join(", ")));
        lines.push(format!("aliases: {}", self.types.aliases.len()));
        lines.push(format!(
            "cache_clarifications: {}",
            self.cache_clarifications()
        ));
        lines.join("\n")
    }
}

/// Load and parse a StatsConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<StatsConfig> {
    if !config_path.exists() {
        return Ok(StatsConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: StatsConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed
        .validate()
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Flag,
    Env,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub source: ConfigSource,
}

impl ConfigLocation {
    /// Loads the file. A path named by flag or env must exist; the default
    /// location falls back to built-in defaults when absent.
    pub fn load(&self) -> Result<StatsConfig> {
        if self.source != ConfigSource::Default && !self.path.exists() {
            bail!(
                "config file not found: {} (from {})",
                self.path.display(),
                self.source.as_str()
            );
        }
        load_config(&self.path)
    }
}

/// Pick the config file: flag > env PROPSTATS_CONFIG > `propstats.toml` in `cwd`.
pub fn resolve_config_path(flag: Option<&Path>, cwd: &Path) -> ConfigLocation {
    locate_config(flag, env_override("PROPSTATS_CONFIG"), cwd)
}

fn locate_config(flag: Option<&Path>, env_path: Option<String>, cwd: &Path) -> ConfigLocation {
    if let Some(path) = flag {
        return ConfigLocation {
            path: path.to_path_buf(),
            source: ConfigSource::Flag,
        };
    }
    if let Some(value) = env_path {
        return ConfigLocation {
            path: PathBuf::from(value),
            source: ConfigSource::Env,
        };
    }
    ConfigLocation {
        path: cwd.join(DEFAULT_CONFIG_FILENAME),
        source: ConfigSource::Default,
    }
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
