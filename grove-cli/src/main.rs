mod cmd;
mod config;

use anyhow::Result;
use clap::Command;
use env_logger::Env;

fn cli() -> Command {
    Command::new("grove")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build a blog from markdown and a single descriptor file")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(cmd::build::make_subcommand())
        .subcommand(cmd::develop::make_subcommand())
        .subcommand(cmd::check::make_subcommand())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("build", args)) => cmd::build::execute(args),
        Some(("develop", args)) => cmd::develop::execute(args).await,
        Some(("check", args)) => cmd::check::execute(args),
        _ => unreachable!("subcommand is required"),
    }
}
