//! Command-line front end: option parsing, session setup and the
//! window-less summary run.

use std::any::Any;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use pollster::block_on;

use crate::config::{FetchPolicy, ModelFormat, Settings, ViewerConfig};
use crate::fetch::{ResourceFetcher, StaticCredentials};
use crate::headless::{run_frames, HeadlessHost};
use crate::pipeline::LoadPipeline;
use crate::refs::MemoryRefStore;
use crate::source::{NativeSource, UreqClient};
use crate::viewer::{LoadStatus, Viewer, ViewerStatus};
use crate::window;

/// Environment variable holding the bearer token for direct storage fetches.
pub const TOKEN_ENV: &str = "ARTIFACT_VIEWER_TOKEN";
pub const DEFAULT_HEADLESS_FRAMES: u64 = 60;

const USAGE: &str = "Usage: artifact-viewer <model>... [--config FILE.ron] [--format gltf|glb|obj] \
     [--size WxH] [--no-auto-rotate] [--static] [--origin URL] [--proxy PATH] \
     [--storage-host HOST]... [--summary-only] [--frames N]";

pub type NativePipeline = LoadPipeline<UreqClient, NativeSource>;

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub models: Vec<String>,
    pub config_path: Option<PathBuf>,
    pub format: Option<ModelFormat>,
    pub size: Option<(u32, u32)>,
    pub no_auto_rotate: bool,
    pub static_view: bool,
    pub origin: Option<String>,
    pub proxy: Option<String>,
    pub storage_hosts: Vec<String>,
    pub summary_only: bool,
    pub frames: u64,
}

impl CliOptions {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut options = Self {
            models: Vec::new(),
            config_path: None,
            format: None,
            size: None,
            no_auto_rotate: false,
            static_view: false,
            origin: None,
            proxy: None,
            storage_hosts: Vec::new(),
            summary_only: false,
            frames: DEFAULT_HEADLESS_FRAMES,
        };

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{name} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--config" => options.config_path = Some(PathBuf::from(value("--config")?)),
                "--format" => {
                    let name = value("--format")?;
                    options.format = Some(
                        ModelFormat::from_name(&name)
                            .ok_or_else(|| anyhow!("Unknown format {name:?}. Expected gltf, glb or obj"))?,
                    );
                }
                "--size" => options.size = Some(parse_size(&value("--size")?)?),
                "--no-auto-rotate" => options.no_auto_rotate = true,
                "--static" => options.static_view = true,
                "--origin" => options.origin = Some(value("--origin")?),
                "--proxy" => options.proxy = Some(value("--proxy")?),
                "--storage-host" => options.storage_hosts.push(value("--storage-host")?),
                "--summary-only" => options.summary_only = true,
                "--frames" => {
                    let text = value("--frames")?;
                    options.frames = text
                        .parse()
                        .with_context(|| format!("--frames expects a number, got {text:?}"))?;
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
                model => options.models.push(model.to_string()),
            }
        }
        Ok(options)
    }
}

fn parse_size(text: &str) -> Result<(u32, u32)> {
    let (width, height) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("--size expects WIDTHxHEIGHT, got {text:?}"))?;
    let width: u32 = width.trim().parse().with_context(|| format!("invalid width in {text:?}"))?;
    let height: u32 = height.trim().parse().with_context(|| format!("invalid height in {text:?}"))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("--size must be non-zero, got {text:?}"));
    }
    Ok((width, height))
}

/// Models to show plus the inputs shared by all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub models: Vec<String>,
    pub template: ViewerConfig,
    pub policy: FetchPolicy,
    pub token: Option<String>,
}

impl Session {
    /// Merges a settings file with command-line overrides.
    pub fn new(options: &CliOptions, settings: Settings, token: Option<String>) -> Result<Self> {
        let Settings { viewer, fetch } = settings;
        let mut template = viewer.unwrap_or_else(|| ViewerConfig::new(""));

        let mut models = options.models.clone();
        if models.is_empty() && !template.source_url.is_empty() {
            models.push(template.source_url.clone());
        }
        if models.is_empty() {
            return Err(anyhow!(USAGE));
        }

        if options.format.is_some() {
            template.model_format = options.format;
        }
        if let Some((width, height)) = options.size {
            template.viewport_width = width;
            template.viewport_height = height;
        }
        if options.no_auto_rotate {
            template.auto_rotate = false;
        }
        if options.static_view {
            template.interactive = false;
        }

        let mut policy = fetch;
        if let Some(origin) = &options.origin {
            policy.app_origin = Some(origin.clone());
        }
        if let Some(proxy) = &options.proxy {
            policy.proxy_endpoint = Some(proxy.clone());
        }
        policy.storage_hosts.extend(options.storage_hosts.iter().cloned());

        Ok(Self {
            models,
            template,
            policy,
            token: token.filter(|token| !token.is_empty()),
        })
    }

    pub fn config_for(&self, index: usize) -> ViewerConfig {
        ViewerConfig {
            source_url: self.models[index % self.models.len()].clone(),
            ..self.template.clone()
        }
    }

    pub fn pipeline(&self, refs: Arc<MemoryRefStore>) -> NativePipeline {
        let fetcher = ResourceFetcher::new(UreqClient, refs.clone(), self.policy.clone())
            .with_credentials(Arc::new(StaticCredentials::new(self.token.clone())));
        LoadPipeline::new(fetcher, NativeSource::new(refs))
    }
}

/// Parses `args`, then opens a window or runs the summary.
pub fn run<I>(args: I) -> Result<()>
where
    I: IntoIterator<Item = String>,
{
    let options = CliOptions::parse(args)?;
    let settings = match &options.config_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let session = Session::new(&options, settings, env::var(TOKEN_ENV).ok())?;

    if options.summary_only {
        return run_headless(&session, options.frames);
    }
    match window::run_windowed(session.clone()) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or WAYLAND_DISPLAY to enable rendering)."
            );
            run_headless(&session, options.frames)
        }
        Err(err) => Err(err),
    }
}

/// Mounts every model without a window, renders `frames` CPU-only frames
/// each, and prints what happened.
pub fn run_headless(session: &Session, frames: u64) -> Result<()> {
    let refs = Arc::new(MemoryRefStore::new());
    let pipeline = session.pipeline(Arc::clone(&refs));
    let mut viewer = Viewer::new(HeadlessHost::new(), refs.clone());

    for index in 0..session.models.len() {
        let config = session.config_for(index);
        let url = config.source_url.clone();
        let format = config.format();
        let Some(request) = viewer.configure(config) else {
            continue;
        };
        let generation = request.generation;
        let completion = block_on(pipeline.load(&request, &mut |progress| {
            viewer.report_progress(generation, progress)
        }));

        if viewer.finish_load(completion) != LoadStatus::Ready {
            let message = match viewer.status() {
                ViewerStatus::Failed(err) => err.user_message(),
                other => format!("unexpected viewer state {other:?}"),
            };
            viewer.unmount();
            return Err(anyhow!("could not load {url}: {message}"));
        }

        if let Some(model) = viewer.scene().and_then(|scene| scene.model()) {
            let bounds = model.source_bounds;
            println!(
                "Loaded {url} as {} ({} vertices, {} triangles)",
                format.name(),
                model.mesh.vertex_count(),
                model.mesh.triangle_count()
            );
            println!(
                " - bounds min=({:.3}, {:.3}, {:.3}) max=({:.3}, {:.3}, {:.3})",
                bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
            );
            println!(
                " - normalized scale={:.3} offset=({:.3}, {:.3}, {:.3})",
                model.scale, model.offset.x, model.offset.y, model.offset.z
            );
        }

        let ran = run_frames(&mut viewer, frames);
        let rotation = viewer.rotation().unwrap_or_default();
        println!(
            "Rendered {ran} frame(s); yaw={:.3} pitch={:.3}",
            rotation.yaw, rotation.pitch
        );
    }

    viewer.unmount();
    println!("Released {} local reference(s)", refs.release_calls());
    Ok(())
}

/// Raised when no window can be opened, e.g. without a display server.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    pub fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    pub fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}
