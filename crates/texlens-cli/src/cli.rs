use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use texlens::BackendKind;

#[derive(Parser, Debug)]
#[command(
    name = "texlens",
    author,
    version,
    about = "Inspect flat images, DDS textures and cubemaps"
)]
pub struct Cli {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub inspect: InspectArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine configuration file (defaults to config.toml in the config directory)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Texture backend: auto, wgpu or software
    #[arg(long, value_name = "MODE", value_parser = parse_backend, global = true)]
    pub backend: Option<BackendKind>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InspectArgs {
    /// Report the alternate composite (mip strip or cube cross) where one exists
    #[arg(long)]
    pub alt: bool,

    /// Print one JSON object per file instead of a summary line
    #[arg(long)]
    pub json: bool,

    /// Images to inspect
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the RGBA value of one pixel
    Pixel(PixelArgs),
    /// Print the default engine configuration as TOML
    Defaults,
}

#[derive(Args, Debug, Clone)]
pub struct PixelArgs {
    /// Image to sample
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Column, counted from the left edge
    pub x: u32,

    /// Row, counted from the top edge
    pub y: u32,

    /// Sample the alternate composite instead of the top layer
    #[arg(long)]
    pub alt: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_backend(value: &str) -> Result<BackendKind, String> {
    BackendKind::from_str(value).map_err(|err| err.to_string())
}
