//! Growing or moving series of windows.

use anyhow::{bail, Context, Result};
use infoflow_engine::FlowPipeline;

use crate::config::{ModeArg, RunArgs};

/// Execute the series command.
pub fn execute(args: &RunArgs, mode: ModeArg, shift_days: Option<u32>, init_window_days: Option<u32>) -> Result<()> {
    let mut config = args.resolve()?;
    config.window_mode = Some(mode.into());
    if let Some(shift) = shift_days {
        config.shift_days = shift;
    }
    if let Some(init) = init_window_days {
        config.init_window_days = init;
    }

    let pipeline = FlowPipeline::from_inputs(config, &args.inputs).context("Failed to prepare the run")?;
    let windows = pipeline.windows()?;
    println!(
        "🪟 {} windows ({}), {} actors, output in {}",
        windows.len(),
        pipeline.config().window_mode.unwrap_or_default(),
        pipeline.registry().len(),
        pipeline.store().root().display()
    );

    let report = pipeline.run()?;
    super::print_report(&report);

    if report.completed() == 0 && report.failed() > 0 {
        bail!("every window failed");
    }
    Ok(())
}
