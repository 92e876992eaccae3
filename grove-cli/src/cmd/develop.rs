use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use grove_core::plugins::{PageContext, PageHook, PluginConfig};
use grove_core::scanner::glob_base;
use grove_core::{BuildMode, Descriptor, SiteBuilder};
use grove_dev_server::{LiveServer, LiveServerConfig, ReloadHandle, inject_livereload_script};
use log::{debug, error, info, warn};
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use super::add_build_args;
use crate::config::{BuildConfig, GroveConfig};

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("develop"))
        .about("Build in development mode and serve with live reload")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to serve on [default: 3000]")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Host to bind to [default: 127.0.0.1]"),
        )
        .arg(
            Arg::new("open")
                .long("open")
                .help("Open browser automatically")
                .action(ArgAction::SetTrue),
        )
}

/// Adds the live reload client to every development page.
struct LiveReload {
    host: String,
    port: u16,
}

impl PageHook for LiveReload {
    fn process(&self, html: String, _page: &PageContext<'_>) -> String {
        inject_livereload_script(&html, &self.host, self.port)
    }
}

fn rebuild(descriptor: &Descriptor, build: &BuildConfig) -> Result<()> {
    let report = SiteBuilder::new(descriptor)
        .root(build.root())
        .output_dir(build.output_dir())
        .theme_dir(build.theme_dir())
        .mode(BuildMode::Development)
        .hook(Box::new(LiveReload {
            host: build.host.clone(),
            port: build.port,
        }))
        .build()?
        .render_all()?;
    info!("Built {} page(s)", report.pages.len());
    Ok(())
}

pub async fn execute(args: &ArgMatches) -> Result<()> {
    let config = GroveConfig::load(args)?;
    let build = config.build;

    let descriptor_path = build.descriptor_path();
    let descriptor = Descriptor::load(&descriptor_path)
        .with_context(|| format!("failed to load {}", descriptor_path.display()))?;
    let descriptor = Arc::new(descriptor);

    rebuild(&descriptor, &build).context("initial build failed")?;

    let server = LiveServer::new(LiveServerConfig {
        host: build.host.clone(),
        port: build.port,
        root: build.output_dir(),
        open: build.open,
    });
    let reload = server.reload_handle();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Dev server error: {e}");
        }
    });

    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watch_sources(descriptor, build, reload).await {
            error!("Source watcher error: {e}");
        }
    });

    let _ = tokio::try_join!(server_handle, watcher_handle)?;

    Ok(())
}

/// Directories holding content for each filesystem source, plus the theme.
fn watch_dirs(descriptor: &Descriptor, build: &BuildConfig) -> Vec<PathBuf> {
    let root = build.root();
    let mut dirs: Vec<PathBuf> = descriptor
        .plugins()
        .iter()
        .filter_map(|plugin| match &plugin.config {
            PluginConfig::SourceFilesystem(options) => Some(root.join(glob_base(&options.path))),
            PluginConfig::Fathom(_) => None,
        })
        .collect();
    dirs.push(build.theme_dir());
    dirs.sort();
    dirs.dedup();
    dirs
}

enum Change {
    Content,
    Descriptor,
    Ignored,
}

fn classify(path: &Path, descriptor_file: &Path, output_dir: &Path) -> Change {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if path == descriptor_file {
        Change::Descriptor
    } else if path.starts_with(output_dir) {
        Change::Ignored
    } else {
        Change::Content
    }
}

async fn watch_sources(
    descriptor: Arc<Descriptor>,
    build: BuildConfig,
    reload: ReloadHandle,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(100);

    let mut debouncer = new_debouncer(Duration::from_millis(500), move |res: DebounceEventResult| {
        if let Ok(events) = res {
            for event in events {
                let _ = tx.blocking_send(event.path);
            }
        }
    })?;

    for dir in watch_dirs(&descriptor, &build) {
        if dir.exists() {
            debouncer
                .watcher()
                .watch(&dir, notify::RecursiveMode::Recursive)?;
            info!("Watching {}", dir.display());
        } else {
            debug!("Not watching missing directory {}", dir.display());
        }
    }

    let descriptor_file = build.descriptor_path();
    if descriptor_file.exists() {
        debouncer
            .watcher()
            .watch(&descriptor_file, notify::RecursiveMode::NonRecursive)?;
    }
    let descriptor_file = descriptor_file.canonicalize().unwrap_or(descriptor_file);
    let output_dir = build.output_dir();
    let output_dir = output_dir.canonicalize().unwrap_or(output_dir);

    while let Some(path) = rx.recv().await {
        match classify(&path, &descriptor_file, &output_dir) {
            Change::Ignored => continue,
            Change::Descriptor => {
                warn!(
                    "{} changed; restart `grove develop` to apply it",
                    descriptor_file.display()
                );
                continue;
            }
            Change::Content => debug!("Changed: {}", path.display()),
        }

        match rebuild(&descriptor, &build) {
            Ok(()) => {
                reload.reload();
            }
            Err(e) => error!("Rebuild failed: {e:#}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_dirs_follow_source_globs() {
        let descriptor = Descriptor::from_str(
            r#"
site_name = "x"

[[plugins]]
use = "source-filesystem"
options = { type_name = "Post", path = "content/posts/**/*.md" }

[[plugins]]
use = "source-filesystem"
options = { type_name = "Page", path = "content/posts/*.md" }
"#,
        )
        .unwrap();
        let build = BuildConfig {
            root: "/site".into(),
            ..BuildConfig::default()
        };
        assert_eq!(
            watch_dirs(&descriptor, &build),
            vec![PathBuf::from("/site/content/posts"), PathBuf::from("/site/theme")]
        );
    }

    #[test]
    fn test_output_changes_are_ignored() {
        let descriptor = Path::new("/site/grove.toml");
        let output = Path::new("/site/dist");
        assert!(matches!(
            classify(Path::new("/site/dist/index.html"), descriptor, output),
            Change::Ignored
        ));
        assert!(matches!(
            classify(descriptor, descriptor, output),
            Change::Descriptor
        ));
        assert!(matches!(
            classify(Path::new("/site/content/a.md"), descriptor, output),
            Change::Content
        ));
    }
}
