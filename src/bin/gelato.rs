//! gelato: compile `.gel` templates into files under a destination directory.
//!
//! Usage:
//!   gelato                          # every **/[!_]*.gel into ./build
//!   gelato 'php/**/*.gel' -d out    # explicit sources and destination
//!   gelato -C '{"models": []}'      # context on the command line

use anyhow::{Context as _, Result};
use clap::Parser;
use gelato::config::{RunConfig, TagSettings, DEFAULT_CONFIG_FILE};
use gelato::{Context, Engine, RenderedFile};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "gelato", version)]
#[command(about = "Compile .gel templates into source files")]
struct Args {
    /// Glob patterns selecting the templates to compile
    src: Vec<String>,

    /// JSON config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, short = 'd')]
    dest: Option<String>,

    /// Context as a JSON object; replaces the config file's context
    #[arg(long, short = 'C')]
    context: Option<String>,

    #[arg(long)]
    expression_start_tag: Option<String>,

    #[arg(long)]
    expression_end_tag: Option<String>,

    #[arg(long)]
    control_start_tag: Option<String>,

    #[arg(long)]
    control_end_tag: Option<String>,

    #[arg(long)]
    include_start_tag: Option<String>,

    #[arg(long)]
    include_end_tag: Option<String>,
}

impl Args {
    fn tag_settings(&self) -> TagSettings {
        TagSettings {
            expression_start_tag: self.expression_start_tag.clone(),
            expression_end_tag: self.expression_end_tag.clone(),
            control_start_tag: self.control_start_tag.clone(),
            control_end_tag: self.control_end_tag.clone(),
            include_start_tag: self.include_start_tag.clone(),
            include_end_tag: self.include_end_tag.clone(),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let root = Path::new("");
    let config = load_config(&args, root)?;
    let tags = config.tag_config()?;
    let context = build_context(&args, &config)?;

    let mut engine = Engine::new(tags);
    for (path, spec) in &config.repeat {
        engine.add_repeat(path, spec.clone());
    }

    let dest = root.join(&config.dest);
    for template in expand_sources(root, &config.src)? {
        info!("Reading {}", template.display());
        let source = fs::read_to_string(root.join(&template))
            .with_context(|| format!("could not read '{}'", template.display()))?;

        for file in engine.process(&template, &source, &context)? {
            let output = write_output(&dest, &file)?;
            info!("Done writing {} -> {}", template.display(), output.display());
        }
    }
    Ok(())
}

/// Defaults, then the config file, then the command line. Without
/// `--config`, `gelatorc.json` under `root` is read only if it exists.
fn load_config(args: &Args, root: &Path) -> Result<RunConfig> {
    let default_file = root.join(DEFAULT_CONFIG_FILE);
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None if default_file.is_file() => RunConfig::from_file(&default_file)?,
        None => {
            debug!("no {} found, using defaults", default_file.display());
            RunConfig::default()
        }
    };

    if !args.src.is_empty() {
        config.src = args.src.clone();
    }
    if let Some(dest) = &args.dest {
        config.dest = dest.clone();
    }
    config.tags = config.tags.merge(args.tag_settings());
    Ok(config)
}

/// `--context` replaces the config file's context wholesale.
fn build_context(args: &Args, config: &RunConfig) -> Result<Context> {
    match &args.context {
        Some(json) => {
            let value: serde_json::Value =
                serde_json::from_str(json).context("invalid --context JSON")?;
            Ok(Context::from_json(value)?)
        }
        None => Ok(Context::from(config.context.clone())),
    }
}

/// Files under `root` matching any pattern, relative to `root`, deduplicated
/// and in path order.
fn expand_sources(root: &Path, patterns: &[String]) -> Result<BTreeSet<PathBuf>> {
    let prefix = if root.as_os_str().is_empty() {
        String::new()
    } else {
        format!("{}/", glob::Pattern::escape(&root.to_string_lossy()))
    };
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let full = format!("{}{}", prefix, pattern);
        let entries =
            glob::glob(&full).with_context(|| format!("invalid glob pattern '{}'", pattern))?;
        for entry in entries {
            let path = entry?;
            if path.is_file() {
                let relative = path.strip_prefix(root).map(Path::to_path_buf);
                files.insert(relative.unwrap_or(path));
            }
        }
    }
    debug!(count = files.len(), "expanded sources");
    Ok(files)
}

fn write_output(dest: &Path, file: &RenderedFile) -> Result<PathBuf> {
    let output = dest.join(output_relative_path(&file.path));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create '{}'", parent.display()))?;
    }
    fs::write(&output, &file.body)
        .with_context(|| format!("could not write '{}'", output.display()))?;
    Ok(output)
}

/// `path` with one trailing `.gel` removed and any root or `..` components
/// dropped, so the result always lands inside the destination directory.
fn output_relative_path(path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    let text = relative.to_string_lossy().into_owned();
    match text.strip_suffix(".gel") {
        Some(stripped) => PathBuf::from(stripped),
        None => relative,
    }
}
