//! Default configuration file.

use std::path::Path;

use anyhow::{bail, Result};
use infoflow_engine::FlowConfig;

/// Execute the init command.
pub fn execute(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    FlowConfig::default().save(path)?;
    println!("✅ Wrote {}", path.display());
    Ok(())
}
