//! Image and GPU texture engine for texlens.
//!
//! An [`Image`] turns a file on disk into CPU-visible layers plus GPU
//! textures. The overall flow is:
//!
//! ```text
//!   path ──▶ container::read_container ──▶ DecodedContainer   (CPU, any thread)
//!                                               │
//!                                               ▼
//!            container::resolve ──▶ readback (BC levels round-trip the GPU)
//!                                               │
//!                                               ▼
//!            Image { layers, alt composite, ImageInfo }
//!                                               │ bind()
//!                                               ▼
//!            TextureSlots ──▶ upload_levels ──▶ TextureBackend
//! ```
//!
//! Three source shapes are handled: flat rasters decoded by the `image` crate,
//! mip-chained DDS textures, and DDS cubemaps. Every pixel encoding goes
//! through the single table in [`format`] to pick its upload parameters.
//!
//! The GPU sits behind [`TextureBackend`]. [`WgpuBackend`] drives a headless
//! `wgpu` device; [`SoftwareBackend`] implements the same contract on the CPU
//! and is what the tests run against.

pub mod backend;
pub mod compose;
pub mod config;
pub mod container;
mod error;
pub mod format;
pub mod image;
mod layer;
pub mod lifecycle;
mod picture;
pub mod readback;
pub mod upload;

pub use crate::backend::{GpuTexture, SharedBackend, SoftwareBackend, TextureBackend, TextureId};
#[cfg(feature = "wgpu-backend")]
pub use crate::backend::{WgpuBackend, WgpuBackendOptions};
pub use crate::config::{create_backend, BackendKind, ConfigError, EngineConfig, PowerPreference};
pub use crate::container::{read_container, ContainerKind, DecodedContainer};
pub use crate::error::{ImageError, Result};
pub use crate::format::{upload_params, PixelFormat, UploadParams};
pub use crate::image::{Image, ImageInfo};
pub use crate::layer::{CubeFace, CubeFaces, Layer, Level};
pub use crate::picture::{Picture, DEFAULT_PIXEL};
