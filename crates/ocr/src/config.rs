use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid pattern in store config: {0}")]
    Pattern(#[from] regex::Error),
    #[error("store config '{child}' extends unknown config '{base}'")]
    MissingBase { child: String, base: String },
    #[error("store config extends chain loops: {0}")]
    CyclicExtends(String),
    #[error("no store config named '{0}'")]
    NotFound(String),
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identification {
    pub primary_name: Option<String>,
    pub aliases: Vec<String>,
    pub match_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineFlags {
    pub skew_correction: bool,
    pub membership_extraction: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub membership_pattern: Option<String>,
    pub items_start_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalsConfig {
    /// Replaces the built-in subtotal markers when non-empty.
    pub subtotal_markers: Vec<String>,
    /// Extra markers for the grand-total line.
    pub total_markers: Vec<String>,
    pub tax_ceiling_percent: Decimal,
}

impl Default for TotalsConfig {
    fn default() -> Self {
        Self {
            subtotal_markers: Vec::new(),
            total_markers: Vec::new(),
            tax_ceiling_percent: Decimal::from(20),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub section_start_markers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    pub section_headers: Vec<String>,
    /// `[wrong, right]` pairs applied to product names, case-insensitively.
    pub product_name_typos: Vec<(String, String)>,
    pub points_line_not_item: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WashConfig {
    pub amount_exclude_patterns: Vec<String>,
    pub fee_row_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewConfig {
    pub left_anchor_patterns: Vec<String>,
    pub right_anchor_patterns: Vec<String>,
}

/// Order of the printed sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Header, items, subtotal through total, payment.
    #[default]
    Standard,
    /// Digital receipts that print TOTAL above the items and SUBTOTAL below them.
    TotalFirst,
}

/// Layout hints for one store chain. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub chain_id: Option<String>,
    /// Province or state code; `"BC"` enables fee rows inside the items region.
    pub region: Option<String>,
    pub layout: Layout,
    pub identification: Identification,
    pub pipeline: PipelineFlags,
    pub header: HeaderConfig,
    pub totals: TotalsConfig,
    pub payment: PaymentConfig,
    pub items: ItemsConfig,
    #[serde(alias = "wash_data")]
    pub wash: WashConfig,
    pub skew: SkewConfig,
}

impl StoreConfig {
    /// Parses a single document; an `extends` key is ignored here.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Primary name plus aliases, for store-name recognition.
    pub fn store_names(&self) -> Vec<String> {
        self.identification
            .primary_name
            .iter()
            .chain(&self.identification.aliases)
            .filter(|n| !n.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn matches_merchant(&self, merchant: &str) -> bool {
        let merchant = merchant.trim().to_uppercase();
        if merchant.is_empty() {
            return false;
        }
        let contains = |s: &String| {
            let s = s.trim().to_uppercase();
            !s.is_empty() && merchant.contains(&s)
        };
        let ident = &self.identification;
        ident.primary_name.as_ref().is_some_and(contains)
            || ident.aliases.iter().any(contains)
            || ident.match_keywords.iter().any(contains)
    }

    pub fn is_region(&self, code: &str) -> bool {
        self.region.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(code))
    }
}

// ── Compiled view ─────────────────────────────────────────────────────────────

/// Regexes from a [`StoreConfig`], compiled once per pipeline.
#[derive(Debug, Clone, Default)]
pub struct CompiledConfig {
    pub amount_exclude: Vec<Regex>,
    pub fee_rows: Vec<Regex>,
    pub membership: Option<Regex>,
    pub items_start: Option<Regex>,
    pub skew_left: Vec<Regex>,
    pub skew_right: Vec<Regex>,
    pub typos: Vec<(Regex, String)>,
    pub section_headers: Vec<String>,
}

fn case_insensitive(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| Ok(RegexBuilder::new(p).case_insensitive(true).build()?))
        .collect()
}

fn optional(pattern: &Option<String>) -> Result<Option<Regex>, ConfigError> {
    match pattern.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => Ok(Some(Regex::new(p)?)),
        _ => Ok(None),
    }
}

impl CompiledConfig {
    pub fn compile(config: &StoreConfig) -> Result<Self, ConfigError> {
        let typos = config
            .items
            .product_name_typos
            .iter()
            .filter(|(wrong, _)| !wrong.trim().is_empty())
            .map(|(wrong, right)| {
                let rx = RegexBuilder::new(&regex::escape(wrong.trim()))
                    .case_insensitive(true)
                    .build()?;
                Ok((rx, right.trim().to_string()))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            amount_exclude: case_insensitive(&config.wash.amount_exclude_patterns)?,
            fee_rows: case_insensitive(&config.wash.fee_row_patterns)?,
            membership: optional(&config.header.membership_pattern)?,
            items_start: optional(&config.header.items_start_pattern)?,
            skew_left: case_insensitive(&config.skew.left_anchor_patterns)?,
            skew_right: case_insensitive(&config.skew.right_anchor_patterns)?,
            typos,
            section_headers: config
                .items
                .section_headers
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn is_fee_row(&self, text: &str) -> bool {
        self.fee_rows.iter().any(|p| p.is_match(text))
    }

    /// Text of the first matching fee pattern.
    pub fn fee_label(&self, text: &str) -> Option<String> {
        self.fee_rows
            .iter()
            .find_map(|p| p.find(text))
            .map(|m| m.as_str().trim().to_string())
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

fn deep_merge(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        if key == "extends" {
            continue;
        }
        match value {
            toml::Value::Table(child) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => deep_merge(existing, child),
                _ => {
                    base.insert(key, toml::Value::Table(child));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

fn resolve(
    key: &str,
    raw: &BTreeMap<String, toml::Table>,
    chain: &mut Vec<String>,
) -> Result<toml::Table, ConfigError> {
    if chain.iter().any(|k| k == key) {
        chain.push(key.to_string());
        return Err(ConfigError::CyclicExtends(chain.join(" -> ")));
    }
    let table = raw
        .get(key)
        .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;

    chain.push(key.to_string());
    let merged = match table.get("extends").and_then(toml::Value::as_str) {
        Some(base_key) => {
            if !raw.contains_key(base_key) {
                return Err(ConfigError::MissingBase {
                    child: key.to_string(),
                    base: base_key.to_string(),
                });
            }
            let mut base = resolve(base_key, raw, chain)?;
            deep_merge(&mut base, table.clone());
            base
        }
        None => {
            let mut own = table.clone();
            own.remove("extends");
            own
        }
    };
    chain.pop();
    Ok(merged)
}

/// Every store config in a directory, keyed by file stem, with `extends` resolved.
#[derive(Debug, Clone, Default)]
pub struct StoreConfigRegistry {
    configs: BTreeMap<String, StoreConfig>,
}

impl StoreConfigRegistry {
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let io_err = |source| ConfigError::Io { path: dir.to_path_buf(), source };
        let mut raw = BTreeMap::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
            let table: toml::Table = content.parse()?;
            raw.insert(stem, table);
        }
        Self::from_tables(raw)
    }

    /// Builds a registry from already-parsed documents keyed by name.
    pub fn from_tables(raw: BTreeMap<String, toml::Table>) -> Result<Self, ConfigError> {
        let mut configs = BTreeMap::new();
        for key in raw.keys() {
            let merged = resolve(key, &raw, &mut Vec::new())?;
            let config: StoreConfig = toml::Value::Table(merged).try_into()?;
            configs.insert(key.clone(), config);
        }
        tracing::info!(configs = configs.len(), "loaded store configs");
        Ok(Self { configs })
    }

    pub fn get(&self, key: &str) -> Result<&StoreConfig, ConfigError> {
        self.configs
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))
    }

    /// First config, in key order, whose identification names appear in `merchant`.
    pub fn find_by_merchant(&self, merchant: &str) -> Option<(&str, &StoreConfig)> {
        let found = self
            .configs
            .iter()
            .find(|(_, c)| c.matches_merchant(merchant))
            .map(|(k, c)| (k.as_str(), c));
        match found {
            Some((key, _)) => tracing::debug!(merchant, key, "matched store config"),
            None => tracing::debug!(merchant, "no store config for merchant"),
        }
        found
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
