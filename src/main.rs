use anyhow::Context;
use clap::Parser;
use ubo_resolver::utils::error::{ErrorSeverity, UboError};
use ubo_resolver::utils::{logger, validation::Validate};
use ubo_resolver::{AresGateway, CliConfig, LocalStorage, UboEngine, UboPipeline};

fn exit_with(e: &UboError) -> ! {
    tracing::error!(
        "❌ Assessment failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();
    logger::init_logger(cli.verbose, cli.log_json);

    tracing::info!("Starting ubo-resolver");
    tracing::debug!("CLI config: {:?}", cli);

    let case = cli.to_case_config().unwrap_or_else(|e| exit_with(&e));
    if let Err(e) = case.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    if cli.dry_run {
        let overrides = case.manual_overrides();
        println!("✅ Configuration is valid");
        println!("🏢 Target: {}", case.resolution.root_id);
        println!("📏 Max depth: {}", case.resolution.max_depth);
        println!("⚖️ Threshold: {:.2}%", case.classification.threshold_pct);
        println!("✍️ Manual owners: {}", overrides.len());
        println!("📁 Output: {}", case.output.output_path);
        return Ok(());
    }

    let gateway = AresGateway::new(case.registry.clone()).context("building registry client")?;
    let storage = LocalStorage::new(case.output.output_path.clone());
    let pipeline = UboPipeline::new(gateway, storage, case.clone())
        .with_overrides(case.manual_overrides())
        .with_adjustments(case.adjustments());
    let engine = UboEngine::new(pipeline);

    match engine.run().await {
        Ok(outcome) => {
            let result = &outcome.assessment.result;
            println!("✅ Assessment completed");
            if result.owners.is_empty() {
                println!("👤 No beneficial owner identified");
            }
            for line in result.summary_lines() {
                println!("👤 {}", line);
            }
            for warning in &outcome.assessment.resolution.warnings {
                println!("⚠️ {}", warning);
            }
            for warning in &result.warnings {
                println!("⚠️ {}", warning);
            }
            println!("📁 Report saved to: {}", outcome.output_path);
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}
