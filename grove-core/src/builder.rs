use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use tera::Context;

use crate::descriptor::Descriptor;
use crate::error::BuildError;
use crate::plugins::{BuildMode, PageContext, PageHook, PluginConfig, SourceContext};
use crate::store::{ContentStore, Node, NodeRef};
use crate::template::Renderer;

/// A link to another node, as exposed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct NodeLink {
    pub type_name: String,
    pub id: String,
    pub title: String,
    pub path: Option<String>,
}

/// What [`Site::render_all`] wrote.
#[derive(Debug, Default)]
pub struct RenderReport {
    pub pages: Vec<PathBuf>,
}

pub struct SiteBuilder<'a> {
    descriptor: &'a Descriptor,
    root: PathBuf,
    output_dir: PathBuf,
    theme_dir: PathBuf,
    mode: BuildMode,
    hooks: Vec<Box<dyn PageHook>>,
}

impl<'a> SiteBuilder<'a> {
    pub fn new(descriptor: &'a Descriptor) -> Self {
        Self {
            descriptor,
            root: PathBuf::from("."),
            output_dir: PathBuf::from("./dist"),
            theme_dir: PathBuf::from("./theme"),
            mode: BuildMode::Production,
            hooks: Vec::new(),
        }
    }

    /// Directory that source globs are relative to.
    pub fn root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.root = path.as_ref().to_path_buf();
        self
    }

    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn theme_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.theme_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `hook` on every page after the descriptor's own plugins.
    pub fn hook(mut self, hook: Box<dyn PageHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Ingest and validate all content. Nothing is written.
    pub fn build(self) -> Result<Site<'a>, BuildError> {
        let descriptor = self.descriptor;
        let mut store = ContentStore::new();
        let ctx = SourceContext {
            root: &self.root,
            transformers: &descriptor.transformers,
        };

        for source in descriptor.sources() {
            debug!("Loading source {}", source.type_name());
            source.load(&ctx, &mut store)?;
        }

        let rules: Vec<_> = descriptor
            .sources()
            .map(|source| (source.type_name(), source.refs()))
            .collect();
        store.materialize_refs(&rules)?;

        store.resolve_paths(&descriptor.templates, descriptor.site.path_prefix.as_deref())?;

        for collection in store.collections() {
            info!("{}: {} node(s)", collection.type_name, collection.len());
        }

        if self.mode == BuildMode::Production && fathom_debug(descriptor) {
            warn!("fathom `debug = true` is set; it only changes development builds");
        }

        let mut renderer = Renderer::new(&self.theme_dir)?;
        renderer.set_global_context("site", &descriptor.site);
        renderer.set_global_context("mode", &self.mode);

        Ok(Site {
            descriptor,
            store,
            renderer,
            output_dir: self.output_dir,
            mode: self.mode,
            hooks: self.hooks,
        })
    }
}

pub struct Site<'a> {
    descriptor: &'a Descriptor,
    store: ContentStore,
    renderer: Renderer,
    output_dir: PathBuf,
    mode: BuildMode,
    hooks: Vec<Box<dyn PageHook>>,
}

impl Site<'_> {
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    fn link(&self, node_ref: &NodeRef) -> Option<NodeLink> {
        let node = self.store.node(node_ref)?;
        Some(NodeLink {
            type_name: node.type_name.clone(),
            id: node.id.clone(),
            title: node.title().to_string(),
            path: node.path.clone(),
        })
    }

    fn apply_hooks(&self, html: String, path: &str) -> String {
        let page = PageContext {
            path,
            mode: self.mode,
        };
        let html = self
            .descriptor
            .page_hooks()
            .fold(html, |html, hook| hook.process(html, &page));
        self.hooks
            .iter()
            .fold(html, |html, hook| hook.process(html, &page))
    }

    fn render_node(&self, node: &Node, component: &str) -> Result<String, BuildError> {
        let references: Vec<NodeLink> = node
            .references
            .values()
            .flatten()
            .filter_map(|r| self.link(r))
            .collect();
        let belongs_to: Vec<NodeLink> =
            node.belongs_to.iter().filter_map(|r| self.link(r)).collect();

        let mut context = Context::new();
        context.insert("node", node);
        context.insert("title", node.title());
        context.insert("references", &references);
        context.insert("belongs_to", &belongs_to);

        self.renderer.render(component, &context)
    }

    fn render_index(&self) -> Result<String, BuildError> {
        let mut collections: BTreeMap<&str, Vec<NodeLink>> = BTreeMap::new();
        for collection in self.store.collections() {
            let links = collection
                .nodes()
                .iter()
                .filter_map(|node| self.link(&node.node_ref()))
                .collect();
            collections.insert(&collection.type_name, links);
        }

        let mut context = Context::new();
        context.insert("title", &self.descriptor.site.name);
        context.insert("collections", &collections);
        self.renderer.render("index.html", &context)
    }

    /// Render every templated node, then write them all. A render failure
    /// leaves the output directory untouched.
    pub fn render_all(&self) -> Result<RenderReport, BuildError> {
        let prefix = self.descriptor.site.path_prefix.as_deref().unwrap_or("");
        let mut pages: Vec<(PathBuf, String)> = Vec::new();

        for collection in self.store.collections() {
            let Some(rule) = self.descriptor.template_for(&collection.type_name) else {
                continue;
            };
            for node in collection.nodes() {
                let Some(url) = &node.path else {
                    continue;
                };
                let html = self.render_node(node, &rule.component)?;
                let html = self.apply_hooks(html, url);
                let relative = url.strip_prefix(prefix).unwrap_or(url);
                pages.push((page_file(&self.output_dir, relative), html));
            }
        }

        let index = self.output_dir.join("index.html");
        if self.renderer.has_template("index.html") && !pages.iter().any(|(p, _)| *p == index) {
            let html = self.render_index()?;
            let url = if prefix.is_empty() { "/" } else { prefix };
            pages.push((index, self.apply_hooks(html, url)));
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| BuildError::Io(self.output_dir.clone(), e))?;

        let mut report = RenderReport::default();
        for (file, html) in pages {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BuildError::Io(parent.to_path_buf(), e))?;
            }
            std::fs::write(&file, html).map_err(|e| BuildError::Io(file.clone(), e))?;
            debug!("Wrote {}", file.display());
            report.pages.push(file);
        }

        info!(
            "Wrote {} page(s) to {}",
            report.pages.len(),
            self.output_dir.display()
        );
        Ok(report)
    }
}

fn fathom_debug(descriptor: &Descriptor) -> bool {
    descriptor
        .plugins()
        .iter()
        .any(|plugin| matches!(&plugin.config, PluginConfig::Fathom(options) if options.debug))
}

/// `/tag/go` becomes `<output>/tag/go/index.html`.
fn page_file(output_dir: &Path, url: &str) -> PathBuf {
    url.split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .fold(output_dir.to_path_buf(), |path, segment| path.join(segment))
        .join("index.html")
}

/// Load, validate and emit a site in one go.
pub fn build_site(
    descriptor: &Descriptor,
    root: &Path,
    output_dir: &Path,
    theme_dir: &Path,
    mode: BuildMode,
) -> Result<RenderReport, BuildError> {
    SiteBuilder::new(descriptor)
        .root(root)
        .output_dir(output_dir)
        .theme_dir(theme_dir)
        .mode(mode)
        .build()?
        .render_all()
}
