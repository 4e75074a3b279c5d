//! Show or initialize the configuration file.

use std::path::PathBuf;

use longexpo_common::config::{config_file_path, AppConfig};

pub fn run(
    init: bool,
    force: bool,
    explicit_path: Option<PathBuf>,
    config: AppConfig,
) -> anyhow::Result<()> {
    let path = explicit_path.clone().unwrap_or_else(config_file_path);

    if init {
        if path.exists() && !force {
            anyhow::bail!(
                "Config already exists at {} (use --force to overwrite)",
                path.display()
            );
        }
        let defaults = AppConfig::default();
        let written = match explicit_path {
            Some(path) => {
                defaults.save_to(&path)?;
                path
            }
            None => defaults.save()?,
        };
        println!("Wrote default configuration to {}", written.display());
        return Ok(());
    }

    println!(
        "# {} ({})",
        path.display(),
        if path.exists() { "loaded" } else { "defaults" }
    );
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
