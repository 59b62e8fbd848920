use std::path::{Path, PathBuf};

use contracts::{Agent, WorldMeta};

use crate::StorageError;

/// Per-agent home directories. The markdown files are agent-owned and opaque
/// to the engine; only `.status` is engine-written and read-only reference.
pub fn ensure_home_dir(agents_root: &Path, agent_name: &str) -> Result<PathBuf, StorageError> {
    let home = agents_root.join(agent_name);
    std::fs::create_dir_all(&home)?;

    for (file, header) in [
        ("journal.md", "# Journal\n"),
        ("notes.md", "# Notes\n"),
        ("discoveries.md", "# Discoveries\n"),
    ] {
        let path = home.join(file);
        if !path.exists() {
            std::fs::write(&path, header)?;
        }
    }
    Ok(home)
}

/// Rewrites the agent's `.status` file after a committed tick.
pub fn write_status_file(
    agents_root: &Path,
    agent: &Agent,
    meta: &WorldMeta,
) -> Result<(), StorageError> {
    let home = ensure_home_dir(agents_root, &agent.name)?;
    let status = format!(
        "# Status (system generated)\n\n\
         tick: {}\n\
         time_of_day: {}\n\
         weather: {}\n\
         position: ({}, {})\n\
         inventory: {}\n",
        meta.tick,
        meta.time_of_day().as_str(),
        meta.weather.as_str(),
        agent.position.x,
        agent.position.y,
        agent.inventory.summary(),
    );
    std::fs::write(home.join(".status"), status)?;
    Ok(())
}
