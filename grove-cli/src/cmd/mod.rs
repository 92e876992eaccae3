pub mod build;
pub mod check;
pub mod develop;

use clap::{Arg, Command};

/// Path arguments shared by every subcommand. None carry clap defaults so
/// that `GROVE_*` env vars still apply when a flag is omitted.
pub fn add_build_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .help("Project root that source globs resolve against [default: .]"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Descriptor file, relative to the root [default: grove.toml]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for generated site [default: dist]"),
        )
        .arg(
            Arg::new("theme")
                .short('t')
                .long("theme")
                .value_name("DIR")
                .help("Theme directory [default: theme]"),
        )
}
