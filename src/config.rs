// Runtime configuration.
//
// Every field has a default, so a missing `rfm.toml` simply means "use the
// built-in paths, thresholds and report settings".

use crate::error::{Result, RfmError};
use crate::segment::{SegmentRule, SegmentTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "rfm.toml";
pub const DEFAULT_ORDERS_PATH: &str = "orders_dataset.csv";
pub const DEFAULT_PAYMENTS_PATH: &str = "order_payments_dataset.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
    pub segments: Vec<SegmentRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            scoring: ScoringConfig::default(),
            report: ReportConfig::default(),
            segments: SegmentTable::default().rules().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub orders_path: PathBuf,
    pub payments_path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            orders_path: PathBuf::from(DEFAULT_ORDERS_PATH),
            payments_path: PathBuf::from(DEFAULT_PAYMENTS_PATH),
        }
    }
}

/// What to do when a metric's quartile edges collapse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningPolicy {
    /// Re-bin the metric on its stable first-seen rank.
    #[default]
    RankFallback,
    /// Fail the computation.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub binning_policy: BinningPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub histogram_bins: usize,
    pub page_size: usize,
    pub export_csv: PathBuf,
    pub export_json: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            histogram_bins: 30,
            page_size: 20,
            export_csv: PathBuf::from("rfm_customers.csv"),
            export_json: PathBuf::from("rfm_summary.json"),
        }
    }
}

impl AppConfig {
    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| RfmError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.report.histogram_bins == 0 {
            return Err(RfmError::Config(
                "report.histogram_bins must be at least 1".to_string(),
            ));
        }
        if self.report.page_size == 0 {
            return Err(RfmError::Config(
                "report.page_size must be at least 1".to_string(),
            ));
        }
        self.segment_table().map(|_| ())
    }

    pub fn segment_table(&self) -> Result<SegmentTable> {
        SegmentTable::new(self.segments.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.report.histogram_bins, 30);
        assert_eq!(config.scoring.binning_policy, BinningPolicy::RankFallback);
        assert_eq!(config.segments.len(), 5);
    }

    #[test]
    fn overrides_paths_policy_and_segments() {
        let text = r#"
            [input]
            orders_path = "data/orders.csv"

            [scoring]
            binning_policy = "strict"

            [[segments]]
            min_score = 9
            label = "Champions"

            [[segments]]
            min_score = 3
            label = "Everyone Else"
        "#;
        let config = AppConfig::from_toml_str(text).unwrap();
        assert_eq!(config.input.orders_path, PathBuf::from("data/orders.csv"));
        assert_eq!(
            config.input.payments_path,
            PathBuf::from(DEFAULT_PAYMENTS_PATH)
        );
        assert_eq!(config.scoring.binning_policy, BinningPolicy::Strict);
        let table = config.segment_table().unwrap();
        assert_eq!(table.label_for(9), "Champions");
        assert_eq!(table.label_for(8), "Everyone Else");
    }

    #[test]
    fn rejects_zero_page_size() {
        let err = AppConfig::from_toml_str("[report]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, RfmError::Config(_)));
    }

    #[test]
    fn rejects_non_total_segment_table() {
        let text = "[[segments]]\nmin_score = 5\nlabel = \"Only\"\n";
        assert!(matches!(
            AppConfig::from_toml_str(text),
            Err(RfmError::Config(_))
        ));
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[report\n"),
            Err(RfmError::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn reads_file_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[report]\nhistogram_bins = 12").unwrap();
        let config = AppConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.report.histogram_bins, 12);
        assert_eq!(config.report.page_size, 20);
    }
}
