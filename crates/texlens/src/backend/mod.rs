//! GPU backend seam.
//!
//! The engine talks to the GPU through [`TextureBackend`], a handle-based
//! contract shaped like a classic 2D texture API:
//! - `create_texture` hands out an empty handle;
//! - `define_storage` fixes extent, mip count and destination format;
//! - `set_sampling` applies wrap and filter state;
//! - `write_level` uploads one level (raw blocks for compressed storage);
//! - `read_level_rgba8` decodes one level back to RGBA8;
//! - `delete_texture` releases the handle.
//!
//! [`GpuTexture`] owns a handle and deletes it on drop, so every exit path
//! (including errors halfway through an upload) releases what it allocated.
//!
//! Two implementations ship: [`SoftwareBackend`] emulates the contract on the
//! CPU, and `WgpuBackend` (feature `wgpu-backend`) drives a headless device.

mod blocks;
mod convert;
mod software;
#[cfg(feature = "wgpu-backend")]
mod device;

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::format::{DestFormat, UploadParams};

pub use software::{SoftwareBackend, TextureState};
#[cfg(feature = "wgpu-backend")]
pub use device::{GpuPowerPreference, WgpuBackend, WgpuBackendOptions};

pub(crate) use convert::expand_to_rgba8;

/// Opaque backend texture handle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(std::num::NonZeroU64);

impl TextureId {
    pub(crate) fn new(raw: std::num::NonZeroU64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinFilter {
    Linear,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    pub wrap: Wrap,
    pub mag: Filter,
    pub min: MinFilter,
}

impl Sampling {
    /// Nearest magnification for pixel inspection; trilinear minification when
    /// the texture has a mip chain.
    pub fn for_levels(levels: usize) -> Self {
        Self {
            wrap: Wrap::Repeat,
            mag: Filter::Nearest,
            min: if levels > 1 {
                MinFilter::LinearMipmapLinear
            } else {
                MinFilter::Linear
            },
        }
    }
}

/// Size and mip count of a texture's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureExtent {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

impl TextureExtent {
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// Texture operations the engine needs from a GPU.
///
/// All calls are synchronous and must come from the thread that owns the
/// graphics context.
pub trait TextureBackend {
    fn name(&self) -> &'static str;

    fn create_texture(&self) -> Result<TextureId>;

    fn define_storage(&self, id: TextureId, extent: TextureExtent, dest: DestFormat) -> Result<()>;

    fn set_sampling(&self, id: TextureId, sampling: Sampling) -> Result<()>;

    /// Uploads one level. `data` holds raw blocks when `params.compressed`,
    /// otherwise texels laid out per `params.source_order`/`source_type`.
    fn write_level(
        &self,
        id: TextureId,
        level: u32,
        width: u32,
        height: u32,
        params: &UploadParams,
        data: &[u8],
    ) -> Result<()>;

    /// Decoded RGBA8 texels of `level`, row-major, tightly packed.
    fn read_level_rgba8(&self, id: TextureId, level: u32) -> Result<Vec<u8>>;

    /// Releases `id`. Unknown handles are ignored.
    fn delete_texture(&self, id: TextureId);

    /// Handles currently alive.
    fn live_textures(&self) -> usize;
}

/// Shared handle to the backend used by every image on the GPU thread.
pub type SharedBackend = Rc<dyn TextureBackend>;

/// Owning texture handle; deletes itself on drop.
pub struct GpuTexture {
    backend: SharedBackend,
    id: TextureId,
}

impl GpuTexture {
    pub fn create(backend: &SharedBackend) -> Result<Self> {
        let id = backend.create_texture()?;
        Ok(Self {
            backend: Rc::clone(backend),
            id,
        })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn backend(&self) -> &dyn TextureBackend {
        self.backend.as_ref()
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("backend", &self.backend.name())
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        tracing::trace!(id = %self.id, backend = self.backend.name(), "releasing texture");
        self.backend.delete_texture(self.id);
    }
}
