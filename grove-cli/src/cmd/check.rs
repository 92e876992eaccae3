use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use grove_core::{Descriptor, SiteBuilder};
use log::info;

use super::add_build_args;
use crate::config::GroveConfig;

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("check"))
        .about("Validate the descriptor and content without writing anything")
        .arg(
            Arg::new("print")
                .long("print")
                .help("Print the resolved descriptor as JSON")
                .action(ArgAction::SetTrue),
        )
}

pub fn execute(args: &ArgMatches) -> Result<()> {
    let config = GroveConfig::load(args)?;
    let build = &config.build;

    let descriptor_path = build.descriptor_path();
    let descriptor = Descriptor::load(&descriptor_path)
        .with_context(|| format!("failed to load {}", descriptor_path.display()))?;

    if args.get_flag("print") {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
    }

    let site = SiteBuilder::new(&descriptor)
        .root(build.root())
        .theme_dir(build.theme_dir())
        .build()
        .context("content check failed")?;

    for collection in site.store().collections() {
        let templated = descriptor.template_for(&collection.type_name).is_some();
        println!(
            "{}: {} node(s){}",
            collection.type_name,
            collection.len(),
            if templated { "" } else { " (no template)" }
        );
    }
    info!("{} is valid", descriptor_path.display());

    Ok(())
}
