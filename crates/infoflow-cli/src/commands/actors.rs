//! Actor registration without computing networks.

use std::path::Path;

use anyhow::{Context, Result};
use infoflow_engine::persistence::write_actor_table;
use infoflow_engine::{bounded_table, build_registry, collect_input_files, AnySourceReader};
use tracing::info;

use crate::config::RunArgs;

/// Execute the actors command.
pub fn execute(args: &RunArgs, save: Option<&Path>) -> Result<()> {
    let config = args.resolve()?;

    let files = collect_input_files(&args.inputs)?;
    let records = AnySourceReader::default()
        .read_files(&files)
        .context("Failed to read inputs")?;
    let (bounds, table) = bounded_table(&config, records)?;
    let registry = build_registry(&config, &table, &bounds)?;

    println!("👥 {} actors from {} users", registry.len(), table.users().len());
    println!();
    for actor in registry.actors() {
        println!(
            "   {:<8} {:<10} {:>6}  {}",
            actor.id.as_str(),
            actor.kind.tag().label(),
            actor.num_users,
            actor.long_label
        );
    }

    if let Some(path) = save {
        write_actor_table(path, registry.actors())?;
        info!(path = %path.display(), actors = registry.len(), "Saved actor table");
    }
    Ok(())
}
