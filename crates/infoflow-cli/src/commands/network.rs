//! Single network over the whole range.

use anyhow::{bail, Context, Result};
use infoflow_core::{ClassLabel, TOTAL_COLUMN};
use infoflow_engine::{read_edge_table, ComparisonPair, FlowPipeline, WindowOutcome};

use crate::config::RunArgs;

/// Actors listed as strongest sources after a run.
const TOP_SOURCES: usize = 5;

/// Execute the network command.
pub fn execute(args: &RunArgs) -> Result<()> {
    let mut config = args.resolve()?;
    config.window_mode = None;

    let pipeline = FlowPipeline::from_inputs(config, &args.inputs).context("Failed to prepare the run")?;
    println!(
        "🔗 {} messages, {} actors, {} → {}",
        pipeline.table().len(),
        pipeline.registry().len(),
        pipeline.bounds().start,
        pipeline.bounds().end
    );

    let report = pipeline.run()?;
    super::print_report(&report);

    if report.failed() > 0 {
        bail!("network computation failed");
    }

    if let Some(WindowOutcome::Completed { path, .. }) = report.windows.first().map(|w| &w.outcome) {
        let table = read_edge_table(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let column = if pipeline.config().include_total {
            TOTAL_COLUMN.to_string()
        } else {
            ComparisonPair {
                source: ClassLabel::any(),
                target: ClassLabel::any(),
            }
            .column_name()
        };

        println!();
        println!("🚀 Strongest sources ({column}):");
        for (actor_id, strength) in table.out_strength(&column).into_iter().take(TOP_SOURCES) {
            let label = pipeline
                .registry()
                .get(&actor_id)
                .map(|a| a.long_label.as_str())
                .unwrap_or("?");
            println!("   {:<8} {:>8.4}  {}", actor_id.as_str(), strength, label);
        }
    }
    Ok(())
}
