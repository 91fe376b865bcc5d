use crate::heuristics::catalog::{Catalog, CatalogEntry, DEFAULT_ESTIMATED_PRICE};
use crate::split::TipPolicy;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = ".config/bill_splitter.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub split: SplitSection,
    #[serde(default)]
    pub extract: ExtractSection,
    #[serde(default)]
    pub catalog: CatalogSection,
}

fn default_db_path() -> String {
    "session/bill_splitter.db".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SplitSection {
    /// `none`, `10%` or a cash amount.
    #[serde(default = "default_tip")]
    pub default_tip: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_tip() -> String {
    "none".to_string()
}

fn default_currency_symbol() -> String {
    "€".to_string()
}

impl Default for SplitSection {
    fn default() -> Self {
        Self {
            default_tip: default_tip(),
            currency_symbol: default_currency_symbol(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtractSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for ExtractSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl ExtractSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogSection {
    #[serde(default = "default_estimated_price")]
    pub default_price: f64,
    #[serde(default)]
    pub items: Vec<CatalogEntry>,
}

fn default_estimated_price() -> f64 {
    DEFAULT_ESTIMATED_PRICE
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            default_price: default_estimated_price(),
            items: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            split: SplitSection::default(),
            extract: ExtractSection::default(),
            catalog: CatalogSection::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file gives the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Built-in catalog extended with the configured items.
    pub fn catalog(&self) -> Catalog {
        Catalog::with_entries(&self.catalog.items, self.catalog.default_price)
    }

    pub fn default_tip(&self) -> Result<TipPolicy, Box<dyn std::error::Error>> {
        Ok(self.split.default_tip.parse::<TipPolicy>()?)
    }

    /// Store a new default tip, keeping the rest of the file as written.
    pub fn update_default_tip(
        path: impl AsRef<Path>,
        new_tip: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let policy = new_tip.parse::<TipPolicy>()?;

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let mut doc = content.parse::<DocumentMut>()?;

        doc["split"]["default_tip"] = value(policy.to_string());

        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.db_path, "session/bill_splitter.db");
        assert_eq!(cfg.split.currency_symbol, "€");
        assert_eq!(cfg.extract.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.default_tip().unwrap(), TipPolicy::None);
    }

    #[test]
    fn test_catalog_items_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            r#"
db_path = "tafel7.db"

[split]
default_tip = "10%"

[catalog]
default_price = 4.0

[[catalog.items]]
canonical = "bitterballen"
price = 6.5
synonyms = ["bitterbal"]
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.db_path, "tafel7.db");
        assert_eq!(cfg.default_tip().unwrap(), TipPolicy::PercentOfSubtotal(10.0));
        assert_eq!(cfg.extract.max_file_bytes, 10 * 1024 * 1024);

        let catalog = cfg.catalog();
        assert_eq!(catalog.canonicalize("bitterbal"), ("bitterballen".to_string(), 6.5));
        assert_eq!(catalog.canonicalize("soep").1, 4.0);
        assert_eq!(catalog.canonicalize("biertje").1, 3.5);
    }

    #[test]
    fn test_update_default_tip_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            "# session settings\ndb_path = \"x.db\"\n\n[split]\ndefault_tip = \"none\"\ncurrency_symbol = \"$\"\n",
        )
        .unwrap();

        Config::update_default_tip(&path, "€5,-").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("# session settings"));
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.default_tip().unwrap(), TipPolicy::FixedCash(5.0));
        assert_eq!(cfg.split.currency_symbol, "$");
        assert_eq!(cfg.db_path, "x.db");

        assert!(Config::update_default_tip(&path, "veel").is_err());
    }

    #[test]
    fn test_update_default_tip_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.toml");
        Config::update_default_tip(&path, "12,5%").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.default_tip().unwrap(), TipPolicy::PercentOfSubtotal(12.5));
    }
}
