use crate::config::toml_config::CaseConfig;
use crate::domain::overrides::{parse_owner_pairs, ManualOverrideEntry};
use crate::utils::error::{Result, UboError};
use crate::utils::validation::Validate;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "ubo-resolver")]
#[command(about = "Resolve the ultimate beneficial owners of a company through the business register")]
pub struct CliConfig {
    /// Case file (TOML) with overrides and person adjustments
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Registration number of the company to assess
    #[arg(long)]
    pub root_id: Option<String>,

    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Beneficial-ownership threshold in percent
    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Manual company owners, e.g. `12345678=87654321:50,11223344:50`
    #[arg(long, value_name = "TARGET=ID:PCT,...")]
    pub manual: Vec<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[arg(long, help = "Validate the configuration without contacting the registry")]
    pub dry_run: bool,
}

impl CliConfig {
    /// Builds the effective case: the case file if given, then flag overrides.
    pub fn to_case_config(&self) -> Result<CaseConfig> {
        let mut case = match &self.config {
            Some(path) => {
                tracing::info!("📋 Loading case file {}", path.display());
                CaseConfig::from_file(path)?
            }
            None => CaseConfig::default(),
        };

        if let Some(root_id) = &self.root_id {
            case.resolution.root_id = root_id.clone();
        }
        if let Some(max_depth) = self.max_depth {
            case.resolution.max_depth = max_depth;
        }
        if let Some(threshold) = self.threshold {
            case.classification.threshold_pct = threshold;
        }
        if let Some(output_path) = &self.output_path {
            case.output.output_path = output_path.clone();
        }

        for entry in &self.manual {
            let (target, pairs) = entry.split_once('=').ok_or_else(|| {
                UboError::InvalidConfigValueError {
                    field: "manual".to_string(),
                    value: entry.clone(),
                    reason: "expected TARGET=ID:PCT,...".to_string(),
                }
            })?;
            let entries = case.overrides.entry(target.trim().to_string()).or_default();
            for owner in parse_owner_pairs(pairs)? {
                if let Some(id) = owner.id {
                    entries.push(ManualOverrideEntry::Pair(id, owner.share));
                }
            }
        }

        Ok(case)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        self.to_case_config()?.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ConfigProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_without_case_file() {
        let cli = CliConfig::try_parse_from([
            "ubo-resolver",
            "--root-id",
            "1234567",
            "--threshold",
            "10",
            "--manual",
            "01234567=87654321:60,11223344:40",
        ])
        .unwrap();

        let case = cli.to_case_config().unwrap();

        assert_eq!(case.root_id(), "1234567");
        assert_eq!(case.threshold_pct(), 10.0);
        assert!(case.validate_config().is_ok());
        let overrides = case.manual_overrides();
        assert_eq!(overrides.owners_for("01234567").len(), 2);
        assert!((overrides.owners_for("01234567")[0].share - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_flags_override_case_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[resolution]\nroot_id = \"12345678\"\nmax_depth = 3\n")
            .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = CliConfig::try_parse_from([
            "ubo-resolver",
            "--config",
            path.as_str(),
            "--max-depth",
            "6",
        ])
        .unwrap();
        let case = cli.to_case_config().unwrap();

        assert_eq!(case.root_id(), "12345678");
        assert_eq!(case.max_depth(), 6);
    }

    #[test]
    fn test_malformed_manual_flag_is_rejected() {
        let cli =
            CliConfig::try_parse_from(["ubo-resolver", "--manual", "87654321:50"]).unwrap();
        assert!(cli.to_case_config().is_err());
        assert!(cli.validate().is_err());

        let cli = CliConfig::try_parse_from(["ubo-resolver", "--manual", "12345678=abc:50"])
            .unwrap();
        assert!(cli.to_case_config().is_err());
    }
}
