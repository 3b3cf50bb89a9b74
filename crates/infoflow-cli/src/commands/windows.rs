//! Window listing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use infoflow_engine::WindowSchedule;

use crate::config::ModeArg;

/// Execute the windows command.
pub fn execute(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    shift_days: u32,
    init_window_days: u32,
    mode: ModeArg,
) -> Result<()> {
    let schedule = WindowSchedule {
        start,
        end,
        shift_days,
        init_window_days,
        mode: mode.into(),
    };
    let windows = schedule.windows()?;

    println!("🪟 {} windows", windows.len());
    for (index, window) in windows.iter().enumerate() {
        println!(
            "   {:>3}  {}  ({} days)",
            index,
            window,
            window.length().num_days()
        );
    }
    Ok(())
}
