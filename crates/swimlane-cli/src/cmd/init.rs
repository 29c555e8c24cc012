use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use crate::context::file_store;
use crate::output::{OutputMode, pretty_kv, render};
use swimlane_core::DATA_DIR;
use swimlane_core::config::load_project_config;

#[derive(Args, Debug)]
pub struct InitArgs {}

const CONFIG_TOML: &str = "[concurrency]\n\
    mode = \"last-writer-wins\"\n\
    \n\
    [retry]\n\
    max_attempts = 3\n\
    initial_backoff_ms = 25\n\
    max_backoff_ms = 1000\n\
    \n\
    [store]\n\
    lock_timeout_ms = 5000\n\
    \n\
    # Replace the built-in stages before the first `swl init`:\n\
    # [[seed.groups]]\n\
    # status = \"DRAFT\"\n\
    # title = \"Draft\"\n\
    # stages = [\"Lead\", \"Quote\"]\n";

#[derive(Debug, Serialize)]
struct InitReport {
    initialized: bool,
    root: String,
    version: u64,
    stages: usize,
}

/// Execute `swl init`. Creates the store skeleton:
///
/// ```text
/// .swimlane/
///   config.toml     (written once, never overwritten)
///   taxonomy.json   (seed taxonomy, version 0)
///   items/
/// ```
///
/// Running it on an initialized board is a no-op.
pub fn run_init(_args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let data_dir = project_root.join(DATA_DIR);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let config_path = data_dir.join("config.toml");
    if !config_path.exists() {
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
    }

    let config = load_project_config(project_root)?;
    let store = file_store(project_root, &config);
    let initialized = store.initialize(&config.seed.taxonomy()?)?;
    let taxonomy = store.read_taxonomy()?;

    let report = InitReport {
        initialized,
        root: data_dir.display().to_string(),
        version: taxonomy.version(),
        stages: taxonomy.groups().iter().map(|g| g.stages.len()).sum(),
    };
    render(output, &report, |r, w| {
        if r.initialized {
            writeln!(w, "✓ Initialized board in {}", r.root)?;
            pretty_kv(w, "stages", r.stages.to_string())?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  swl board                     # show the columns")?;
            writeln!(w, "  swl stage add DRAFT \"Review\"  # add a phase")
        } else {
            writeln!(w, "Board already initialized in {} (version {})", r.root, r.version)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_template_parses_to_defaults() {
        let parsed: swimlane_core::config::ProjectConfig = toml::from_str(CONFIG_TOML).unwrap();
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.store.lock_timeout_ms, 5000);
        assert!(parsed.seed.groups.is_empty());
    }
}
