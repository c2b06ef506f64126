use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use texlens::{create_backend, EngineConfig, Image, ImageInfo, SharedBackend};
use tracing_subscriber::EnvFilter;

use crate::cli::{EngineArgs, InspectArgs, PixelArgs};
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn inspect(engine: &EngineArgs, args: InspectArgs) -> Result<()> {
    if args.files.is_empty() {
        bail!("no input files; pass one or more images to inspect");
    }

    let config = load_config(engine)?;
    let backend = create_backend(&config).context("failed to create texture backend")?;
    let show_alt = config.alt_image || args.alt;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0usize;
    for path in &args.files {
        let image = match open_image(&backend, path, show_alt) {
            Ok(image) => image,
            Err(error) => {
                let message = format!("{error:#}");
                tracing::error!(path = %path.display(), error = %message, "failed to load image");
                failed += 1;
                continue;
            }
        };
        let Some(info) = image.info() else {
            continue;
        };
        let report = Report::new(path, &image, info);
        if args.json {
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
        } else {
            writeln!(out, "{}", report.summary_line())?;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} files failed to load", args.files.len());
    }
    Ok(())
}

pub fn pixel(engine: &EngineArgs, args: PixelArgs) -> Result<()> {
    let config = load_config(engine)?;
    let backend = create_backend(&config).context("failed to create texture backend")?;
    let image = open_image(&backend, &args.file, config.alt_image || args.alt)?;
    let [r, g, b, a] = image.pixel(args.x, args.y).0;
    println!("#{r:02x}{g:02x}{b:02x}{a:02x}");
    Ok(())
}

pub fn defaults() -> Result<()> {
    let rendered = toml::to_string_pretty(&EngineConfig::default())
        .context("failed to render default configuration")?;
    print!("{rendered}");
    Ok(())
}

fn load_config(engine: &EngineArgs) -> Result<EngineConfig> {
    let mut config = match &engine.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let path = AppPaths::discover()?.config_file();
            if path.is_file() {
                tracing::debug!(path = %path.display(), "using engine configuration");
                EngineConfig::load(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?
            } else {
                EngineConfig::default()
            }
        }
    };
    if let Some(backend) = engine.backend {
        config.backend = backend;
        config
            .validate()
            .context("--backend conflicts with the configuration file")?;
    }
    Ok(config)
}

fn open_image(backend: &SharedBackend, path: &Path, show_alt: bool) -> Result<Image> {
    let mut image = Image::new(SharedBackend::clone(backend));
    image
        .try_load_path(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if show_alt {
        image.set_alt_image_enabled(true);
    }
    image.log_info();
    Ok(image)
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    path: &'a Path,
    #[serde(flatten)]
    info: &'a ImageInfo,
    layers: usize,
    alt_image: Option<[u32; 2]>,
    showing_alt: bool,
}

impl<'a> Report<'a> {
    fn new(path: &'a Path, image: &Image, info: &'a ImageInfo) -> Self {
        Self {
            path,
            info,
            layers: image.layers().len(),
            alt_image: image.alt_image().map(|alt| [alt.width(), alt.height()]),
            showing_alt: image.alt_image_enabled(),
        }
    }

    fn summary_line(&self) -> String {
        let info = self.info;
        let depth = info
            .src_bit_depth
            .map(|bits| format!("{bits}-bit"))
            .unwrap_or_else(|| "block".to_string());
        let mut line = format!(
            "{}: {} {}x{} {} {} mips={} {} {} bytes",
            self.path.display(),
            info.container,
            info.width,
            info.height,
            info.pixel_format.name(),
            depth,
            info.mipmaps,
            if info.opaque { "opaque" } else { "alpha" },
            info.size_bytes,
        );
        if let (true, Some([width, height])) = (self.showing_alt, self.alt_image) {
            line.push_str(&format!(" alt={width}x{height}"));
        }
        line
    }
}
