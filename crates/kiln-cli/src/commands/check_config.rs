//! `kiln check-config`: Validate a configuration file.

use std::path::Path;

use anyhow::{bail, Context as _};
use kiln_runtime::{DirectoryModules, KilnConfig};

use super::Context;
use crate::output::StyledOutput;

pub fn execute(ctx: &Context, out: &mut StyledOutput, path: Option<&Path>) -> anyhow::Result<()> {
    let path = match path.map(Path::to_path_buf).or_else(|| ctx.config_path()) {
        Some(path) => path,
        None => bail!("No kiln.toml or kiln.json found in the current directory"),
    };

    let config = KilnConfig::from_file(&path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;

    out.success("✓ ");
    out.plain(&format!("{} is valid", path.display()));
    out.newline();
    out.attribute("Aliases", &config.loader.aliases.len().to_string());
    out.attribute("Instances", &config.loader.instances.len().to_string());
    out.attribute("Modules", &config.modules.root.display().to_string());

    let modules = DirectoryModules::new(&config.modules.root);
    let found = modules.discover().unwrap_or_default();
    let missing: Vec<&String> = config
        .loader
        .instances
        .keys()
        .chain(config.modules.preload.iter())
        .filter(|id| !found.contains(*id))
        .collect();
    for id in &missing {
        out.warning("  missing module: ");
        out.plain(id);
        out.newline();
    }
    Ok(())
}
