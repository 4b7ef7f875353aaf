use std::path::Path;

use anyhow::{bail, Context, Result};
use sonar_core::config::CONFIG_FILE_NAME;
use sonar_core::Config;

pub fn init(path: &Path, compose_dir: &str, force: bool) -> Result<()> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }

    let target = path.join(CONFIG_FILE_NAME);
    if target.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            target.display()
        );
    }

    let config = Config::scaffold(compose_dir);
    config
        .validate()
        .context("generated configuration is invalid")?;
    let content = config.to_toml_string()?;

    std::fs::write(&target, content)
        .with_context(|| format!("failed to write {}", target.display()))?;

    println!("✓ Generated {}", target.display());
    println!("  Compose directory: {}", config.service.compose_dir);
    println!("  Status endpoint:   {}", config.service.status_url());
    Ok(())
}
