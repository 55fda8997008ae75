use crate::core::aggregator::{aggregate, PersonAggregates};
use crate::core::classifier::{classify, merge_persons, AdjustmentState, FinalPersonRecord, UboResult};
use crate::core::resolver;
use crate::domain::model::{render_lines, NodeLine};
use crate::domain::overrides::ManualOverrides;
use crate::domain::ports::{ConfigProvider, Pipeline, RegistryGateway, Storage};
use crate::domain::tree::Resolution;
use crate::utils::error::{Result, UboError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use tokio::sync::RwLock;
use zip::write::{FileOptions, ZipWriter};

pub const REPORT_FILE: &str = "ubo_report.zip";

/// Everything one classification produced, as handed to report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub root_id: String,
    pub generated_at: DateTime<Utc>,
    pub threshold_pct: f64,
    pub resolution: Resolution,
    pub lines: Vec<NodeLine>,
    pub aggregates: PersonAggregates,
    pub persons: BTreeMap<String, FinalPersonRecord>,
    pub result: UboResult,
}

#[derive(Debug, Serialize)]
struct PersonRow<'a> {
    name: &'a str,
    capital_pct: String,
    voting_pct: String,
    veto: bool,
    appoints_majority: bool,
    substitute_ubo: bool,
    beneficial_owner: bool,
    reasons: String,
}

pub struct UboPipeline<G: RegistryGateway, S: Storage, C: ConfigProvider> {
    gateway: G,
    storage: S,
    config: C,
    overrides: ManualOverrides,
    adjustments: RwLock<AdjustmentState>,
}

impl<G: RegistryGateway, S: Storage, C: ConfigProvider> UboPipeline<G, S, C> {
    pub fn new(gateway: G, storage: S, config: C) -> Self {
        Self {
            gateway,
            storage,
            config,
            overrides: ManualOverrides::new(),
            adjustments: RwLock::new(AdjustmentState::default()),
        }
    }

    pub fn with_overrides(mut self, overrides: ManualOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_adjustments(self, adjustments: AdjustmentState) -> Self {
        Self {
            adjustments: RwLock::new(adjustments),
            ..self
        }
    }

    /// Replaces the adjustment state; the next [`Pipeline::assess`] picks it up.
    pub async fn update_adjustments(&self, adjustments: AdjustmentState) {
        *self.adjustments.write().await = adjustments;
    }

    pub async fn adjustments(&self) -> AdjustmentState {
        self.adjustments.read().await.clone()
    }

    fn ownership_text(&self, assessment: &Assessment) -> String {
        let mut out = vec![
            format!("Ownership structure of {}", assessment.root_id),
            format!("Generated at {}", assessment.generated_at.to_rfc3339()),
            String::new(),
        ];
        out.extend(render_lines(&assessment.lines));

        if !assessment.resolution.warnings.is_empty() {
            out.push(String::new());
            out.push("Warnings:".to_string());
            out.extend(
                assessment
                    .resolution
                    .warnings
                    .iter()
                    .map(|w| format!("- {}", w)),
            );
        }

        out.push(String::new());
        out.push(format!(
            "Beneficial owners (threshold {:.2}%):",
            assessment.threshold_pct
        ));
        if assessment.result.owners.is_empty() {
            out.push("- none identified".to_string());
        }
        out.extend(assessment.result.summary_lines().into_iter().map(|l| format!("- {}", l)));
        out.extend(assessment.result.warnings.iter().map(|w| format!("⚠️ {}", w)));
        out.join("\n")
    }

    fn persons_csv(&self, assessment: &Assessment) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (name, person) in &assessment.persons {
            let reasons: Vec<String> = assessment
                .result
                .reasons
                .get(name)
                .map(|rs| rs.iter().map(ToString::to_string).collect())
                .unwrap_or_default();
            writer.serialize(PersonRow {
                name,
                capital_pct: format!("{:.2}", person.capital * 100.0),
                voting_pct: format!("{:.2}", person.voting * 100.0),
                veto: person.veto,
                appoints_majority: person.appoints_majority,
                substitute_ubo: person.substitute_ubo,
                beneficial_owner: assessment.result.is_owner(name),
                reasons: reasons.join("; "),
            })?;
        }
        writer.into_inner().map_err(|e| UboError::ProcessingError {
            message: format!("CSV buffer could not be flushed: {}", e),
        })
    }

    fn registry_links(&self, assessment: &Assessment) -> String {
        assessment
            .resolution
            .tree
            .companies()
            .into_iter()
            .map(|(name, id)| match self.config.public_register_url() {
                Some(template) => format!("{} ({}): {}", name, id, template.replace("{id}", &id)),
                None => format!("{} ({})", name, id),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl<G: RegistryGateway, S: Storage, C: ConfigProvider> Pipeline for UboPipeline<G, S, C> {
    type Resolved = Resolution;
    type Assessed = Assessment;

    async fn resolve(&self) -> Result<Resolution> {
        tracing::debug!(
            "Resolving {} (max depth {}, {} manual owners)",
            self.config.root_id(),
            self.config.max_depth(),
            self.overrides.len()
        );
        resolver::resolve(
            &self.gateway,
            self.config.root_id(),
            self.config.max_depth(),
            &self.overrides,
        )
        .await
    }

    async fn assess(&self, resolution: Resolution) -> Result<Assessment> {
        let adjustments = self.adjustments().await;
        let aggregates = aggregate(&resolution.tree);
        let persons = merge_persons(&aggregates, &adjustments);
        let threshold_pct = self.config.threshold_pct();
        let result = classify(&persons, threshold_pct / 100.0, adjustments.coalition.as_ref());

        for warning in &result.warnings {
            tracing::warn!("⚖️ {}", warning);
        }

        Ok(Assessment {
            root_id: self.config.root_id().to_string(),
            generated_at: Utc::now(),
            threshold_pct,
            lines: resolution.tree.lines(),
            resolution,
            aggregates,
            persons,
            result,
        })
    }

    async fn publish(&self, assessment: Assessment) -> Result<String> {
        let output_path = format!("{}/{}", self.config.output_path(), REPORT_FILE);

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("ownership.txt", FileOptions::default())?;
            zip.write_all(self.ownership_text(&assessment).as_bytes())?;

            zip.start_file::<_, ()>("persons.csv", FileOptions::default())?;
            zip.write_all(&self.persons_csv(&assessment)?)?;

            zip.start_file::<_, ()>("assessment.json", FileOptions::default())?;
            zip.write_all(serde_json::to_string_pretty(&assessment)?.as_bytes())?;

            zip.start_file::<_, ()>("registry_links.txt", FileOptions::default())?;
            zip.write_all(self.registry_links(&assessment).as_bytes())?;

            zip.finish()?.into_inner()
        };

        tracing::debug!("Writing report ({} bytes) to storage", zip_data.len());
        self.storage.write_file(REPORT_FILE, &zip_data).await?;
        Ok(output_path)
    }
}
