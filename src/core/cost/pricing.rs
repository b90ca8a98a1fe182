use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::cost::cache;

pub const DEFAULT_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// How long a downloaded catalog is trusted before refetching.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const FAMILY_PREFIXES: &[&str] = &["claude-", "anthropic/claude-", "anthropic.claude-"];
const NAMESPACE_PREFIXES: &[&str] = &["anthropic/", "anthropic."];

/// Size tiers, most expensive first. The first one doubles as the default guess.
const FAMILIES: &[&str] = &["opus", "sonnet", "haiku"];

/// Per-model token pricing in dollars per token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_token: f64,
    pub output_per_token: f64,
    pub cache_create_per_token: f64,
    pub cache_read_per_token: f64,
}

pub type PricingTable = HashMap<String, ModelPricing>;

/// Hardcoded rates used when neither the cache nor the network produce a table.
static FALLBACK_TABLE: &[(&str, ModelPricing)] = &[
    (
        "claude-opus-4-6",
        ModelPricing {
            input_per_token: 5e-6,
            output_per_token: 2.5e-5,
            cache_create_per_token: 6.25e-6,
            cache_read_per_token: 5e-7,
        },
    ),
    (
        "claude-sonnet-4-6",
        ModelPricing {
            input_per_token: 3e-6,
            output_per_token: 1.5e-5,
            cache_create_per_token: 3.75e-6,
            cache_read_per_token: 3e-7,
        },
    ),
    (
        "claude-haiku-4-5",
        ModelPricing {
            input_per_token: 1e-6,
            output_per_token: 5e-6,
            cache_create_per_token: 1.25e-6,
            cache_read_per_token: 1e-7,
        },
    ),
];

pub fn fallback_table() -> PricingTable {
    FALLBACK_TABLE
        .iter()
        .map(|(model, pricing)| (model.to_string(), *pricing))
        .collect()
}

/// Where the pricing catalog comes from and where it is cached.
#[derive(Debug, Clone)]
pub struct PricingSource {
    pub url: String,
    pub cache_path: PathBuf,
    pub ttl: Duration,
}

impl Default for PricingSource {
    fn default() -> Self {
        Self {
            url: DEFAULT_PRICING_URL.to_string(),
            cache_path: cache::cache_dir().join("litellm-pricing.json"),
            ttl: CACHE_TTL,
        }
    }
}

/// Catalog entry shape; only the cost fields are read.
#[derive(Deserialize)]
struct CatalogEntry {
    input_cost_per_token: Option<f64>,
    output_cost_per_token: Option<f64>,
    cache_creation_input_token_cost: Option<f64>,
    cache_read_input_token_cost: Option<f64>,
}

/// Parse a catalog into a table of assistant-family models.
/// Returns None when nothing usable is found so the caller moves to the next tier.
pub fn parse_catalog(data: &[u8]) -> Option<PricingTable> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_slice(data).ok()?;

    let mut table = PricingTable::new();
    for (key, value) in raw {
        let lower = key.to_lowercase();
        if !FAMILY_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }
        let entry: CatalogEntry = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let (input, output) = match (entry.input_cost_per_token, entry.output_cost_per_token) {
            (Some(i), Some(o)) => (i, o),
            _ => continue,
        };

        let model = NAMESPACE_PREFIXES
            .iter()
            .find(|p| lower.starts_with(*p))
            .map(|p| key[p.len()..].to_string())
            .unwrap_or(key);

        table.insert(
            model,
            ModelPricing {
                input_per_token: input,
                output_per_token: output,
                cache_create_per_token: entry.cache_creation_input_token_cost.unwrap_or(input),
                cache_read_per_token: entry.cache_read_input_token_cost.unwrap_or(input),
            },
        );
    }

    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

/// Read the cached catalog if it is younger than `ttl`.
pub fn load_cached(path: &Path, ttl: Duration) -> Option<PricingTable> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    // A timestamp in the future counts as fresh.
    let fresh = SystemTime::now()
        .duration_since(modified)
        .map(|age| age < ttl)
        .unwrap_or(true);
    if !fresh {
        tracing::debug!("Pricing cache at {} is stale", path.display());
        return None;
    }
    let data = std::fs::read(path).ok()?;
    parse_catalog(&data)
}

fn write_cache(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
    }
    std::fs::write(path, data)
        .with_context(|| format!("Failed to write pricing cache to {}", path.display()))?;
    Ok(())
}

async fn download_catalog(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .context("Failed to fetch pricing catalog")?;

    if !response.status().is_success() {
        anyhow::bail!("Pricing catalog returned HTTP {}", response.status().as_u16());
    }

    let bytes = response
        .bytes()
        .await
        .context("Failed to read pricing catalog body")?;
    Ok(bytes.to_vec())
}

/// Fetch the catalog and persist the raw bytes when they parse.
pub async fn fetch_from_network(source: &PricingSource) -> Option<PricingTable> {
    let data = match download_catalog(&source.url).await {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!("Pricing download failed: {:#}", e);
            return None;
        }
    };
    let table = parse_catalog(&data)?;
    if let Err(e) = write_cache(&source.cache_path, &data) {
        tracing::warn!("{:#}", e);
    }
    Some(table)
}

/// Resolve a pricing table: fresh cache, then network, then the built-in table.
/// Never fails.
pub async fn fetch_pricing(source: &PricingSource) -> PricingTable {
    if let Some(table) = load_cached(&source.cache_path, source.ttl) {
        tracing::debug!("Using cached pricing ({} models)", table.len());
        return table;
    }
    if let Some(table) = fetch_from_network(source).await {
        tracing::debug!("Fetched pricing catalog ({} models)", table.len());
        return table;
    }
    tracing::info!("Pricing catalog unavailable, using built-in rates");
    fallback_table()
}

/// Infer the size tier from a model name, defaulting to the most expensive one.
pub fn model_family(model: &str) -> &'static str {
    let lower = model.to_lowercase();
    FAMILIES
        .iter()
        .find(|f| lower.contains(*f))
        .copied()
        .unwrap_or(FAMILIES[0])
}

/// Look up pricing for a model.
///
/// Exact key first. Otherwise every key of the same family is a candidate and the
/// lexicographically greatest one wins, on the assumption that later versions sort
/// last. That holds for current naming but is not guaranteed.
pub fn resolve(model: &str, table: &PricingTable) -> ModelPricing {
    if let Some(p) = table.get(model) {
        return *p;
    }

    let family = model_family(model);
    if let Some((_, p)) = table
        .iter()
        .filter(|(key, _)| key.to_lowercase().contains(family))
        .max_by(|a, b| a.0.cmp(b.0))
    {
        return *p;
    }

    FALLBACK_TABLE
        .iter()
        .find(|(key, _)| key.contains(family))
        .map(|(_, p)| *p)
        .unwrap_or(FALLBACK_TABLE[0].1)
}

/// Cost in dollars for a set of token counts.
pub fn calculate_cost(
    pricing: &ModelPricing,
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_tokens: u64,
    cache_read_tokens: u64,
) -> f64 {
    input_tokens as f64 * pricing.input_per_token
        + output_tokens as f64 * pricing.output_per_token
        + cache_creation_tokens as f64 * pricing.cache_create_per_token
        + cache_read_tokens as f64 * pricing.cache_read_per_token
}
