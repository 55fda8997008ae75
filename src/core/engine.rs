use crate::core::pipeline::Assessment;
use crate::domain::ports::Pipeline;
use crate::domain::tree::Resolution;
use crate::utils::error::Result;

/// Outcome of a full run: where the report went and what it contained.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output_path: String,
    pub assessment: Assessment,
}

pub struct UboEngine<P: Pipeline<Resolved = Resolution, Assessed = Assessment>> {
    pipeline: P,
}

impl<P> UboEngine<P>
where
    P: Pipeline<Resolved = Resolution, Assessed = Assessment>,
{
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        tracing::info!("🚀 Starting beneficial-owner assessment");

        tracing::info!("🔎 Resolving ownership structure...");
        let resolution = self.pipeline.resolve().await?;
        tracing::info!(
            "🌳 Ownership tree resolved with {} warnings",
            resolution.warnings.len()
        );
        for warning in &resolution.warnings {
            tracing::warn!("⚠️ {}", warning);
        }

        tracing::info!("⚖️ Classifying persons...");
        let assessment = self.pipeline.assess(resolution).await?;
        tracing::info!(
            "👤 {} persons found, {} beneficial owners",
            assessment.persons.len(),
            assessment.result.owners.len()
        );

        tracing::info!("📦 Publishing report...");
        let output_path = self.pipeline.publish(assessment.clone()).await?;
        tracing::info!("✅ Report saved to: {}", output_path);

        Ok(RunOutcome {
            output_path,
            assessment,
        })
    }
}
