use anyhow::{Context, Result};
use clap::{ArgMatches, Command};
use grove_core::{BuildMode, Descriptor, build_site};
use log::info;

use super::add_build_args;
use crate::config::GroveConfig;

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("build")).about("Build the static site for deployment")
}

pub fn execute(args: &ArgMatches) -> Result<()> {
    let config = GroveConfig::load(args)?;
    let build = &config.build;

    let descriptor_path = build.descriptor_path();
    let descriptor = Descriptor::load(&descriptor_path)
        .with_context(|| format!("failed to load {}", descriptor_path.display()))?;

    let output_dir = build.output_dir();
    let report = build_site(
        &descriptor,
        &build.root(),
        &output_dir,
        &build.theme_dir(),
        BuildMode::Production,
    )
    .context("build failed")?;

    info!(
        "Site built successfully in {} ({} pages)",
        output_dir.display(),
        report.pages.len()
    );

    Ok(())
}
