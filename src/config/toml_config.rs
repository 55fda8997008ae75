use crate::adapters::registry::RegistrySettings;
use crate::core::classifier::{
    AdjustmentState, ManualPerson, PersonAdjustment, VotingCoalition, DEFAULT_THRESHOLD_PCT,
};
use crate::core::resolver::DEFAULT_MAX_DEPTH;
use crate::domain::overrides::{normalize_domestic_id, ManualOverrideEntry, ManualOverrides};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, UboError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// A case file: one assessment target plus everything the user has added to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseConfig {
    #[serde(default)]
    pub case: CaseSection,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Manual owners keyed by target identifier.
    #[serde(default)]
    pub overrides: HashMap<String, Vec<ManualOverrideEntry>>,
    /// Adjustments to computed persons, keyed by display name.
    #[serde(default)]
    pub persons: BTreeMap<String, PersonAdjustment>,
    #[serde(default)]
    pub manual_persons: Vec<ManualPerson>,
    #[serde(default)]
    pub coalition: Option<VotingCoalition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseSection {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default)]
    pub root_id: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            root_id: String::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            threshold_pct: DEFAULT_THRESHOLD_PCT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_threshold_pct() -> f64 {
    DEFAULT_THRESHOLD_PCT
}

fn default_output_path() -> String {
    "./output".to_string()
}

impl CaseConfig {
    /// Loads a case file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(UboError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| UboError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| UboError::ConfigError {
            message: format!("Cannot serialize case file: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
            })
            .into_owned()
    }

    pub fn manual_overrides(&self) -> ManualOverrides {
        ManualOverrides::from_entries(&self.overrides)
    }

    /// Adjustment state as it currently stands in the case file.
    pub fn adjustments(&self) -> AdjustmentState {
        AdjustmentState {
            persons: self.persons.clone(),
            manual_persons: self.manual_persons.clone(),
            coalition: self.coalition.clone(),
        }
    }

    pub fn set_adjustments(&mut self, state: AdjustmentState) {
        self.persons = state.persons;
        self.manual_persons = state.manual_persons;
        self.coalition = state.coalition;
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.resolution.root_id.trim().is_empty() {
            return Err(UboError::MissingConfigError {
                field: "resolution.root_id".to_string(),
            });
        }
        if normalize_domestic_id(&self.resolution.root_id).is_none() {
            return Err(UboError::InvalidConfigValueError {
                field: "resolution.root_id".to_string(),
                value: self.resolution.root_id.clone(),
                reason: "Expected a 7 or 8 digit registration number".to_string(),
            });
        }
        validation::validate_range(
            "classification.threshold_pct",
            self.classification.threshold_pct,
            0.0,
            100.0,
        )?;
        validation::validate_endpoint_template("registry.endpoint", &self.registry.endpoint)?;
        if let Some(link) = &self.registry.public_register_url {
            validation::validate_endpoint_template("registry.public_register_url", link)?;
        }
        validation::validate_positive_number(
            "registry.timeout_seconds",
            self.registry.timeout_seconds as usize,
            1,
        )?;
        validation::validate_path("output.output_path", &self.output.output_path)?;

        if let Some(coalition) = &self.coalition {
            validation::validate_non_empty_string("coalition.name", &coalition.name)?;
        }
        for (name, adjustment) in &self.persons {
            for value in [adjustment.capital, adjustment.voting].into_iter().flatten() {
                validation::validate_range(&format!("persons.{}", name), value, 0.0, 1.0)?;
            }
        }
        for person in &self.manual_persons {
            validation::validate_non_empty_string("manual_persons.name", &person.name)?;
            let field = format!("manual_persons.{}", person.name);
            validation::validate_range(&field, person.capital, 0.0, 1.0)?;
            validation::validate_range(&field, person.voting, 0.0, 1.0)?;
        }
        Ok(())
    }
}

impl ConfigProvider for CaseConfig {
    fn root_id(&self) -> &str {
        &self.resolution.root_id
    }

    fn max_depth(&self) -> usize {
        self.resolution.max_depth
    }

    fn threshold_pct(&self) -> f64 {
        self.classification.threshold_pct
    }

    fn output_path(&self) -> &str {
        &self.output.output_path
    }

    fn public_register_url(&self) -> Option<&str> {
        self.registry.public_register_url.as_deref()
    }
}

impl Validate for CaseConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
