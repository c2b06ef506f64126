//! The image facade: one file, its decoded layers, derived composites, and
//! the GPU textures bound from them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Local};
use image::Rgba;
use serde::Serialize;

use crate::backend::{SharedBackend, TextureId};
use crate::compose::{cube_cross, mip_strip};
use crate::container::{read_container, resolve, ContainerKind, DecodedContainer, DecodedImage};
use crate::error::{ImageError, Result};
use crate::format::PixelFormat;
use crate::layer::{CubeFace, Level};
use crate::lifecycle::{Selector, TextureSlots};
use crate::picture::{Picture, DEFAULT_PIXEL};

static LOADED_IMAGES: AtomicUsize = AtomicUsize::new(0);

/// Metadata captured when a load succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub src_bit_depth: Option<u32>,
    pub opaque: bool,
    pub mipmaps: usize,
    pub size_bytes: u64,
    pub container: ContainerKind,
    pub loaded_at: DateTime<Local>,
}

#[derive(Debug)]
struct LoadedState {
    decoded: DecodedImage,
    alt: Option<Picture>,
    info: ImageInfo,
}

impl LoadedState {
    fn new(decoded: DecodedImage, size_bytes: u64) -> Result<Self> {
        let first = decoded
            .layers
            .first()
            .ok_or_else(|| ImageError::gpu("decoded image has no layers"))?;
        let info = ImageInfo {
            width: first.width(),
            height: first.height(),
            pixel_format: decoded.format,
            src_bit_depth: decoded.src_bit_depth,
            opaque: decoded.opaque,
            mipmaps: decoded.layers.len(),
            size_bytes,
            container: decoded.kind,
            loaded_at: Local::now(),
        };
        let alt = build_alt(&decoded);
        Ok(Self { decoded, alt, info })
    }

    /// Pictures uploaded to the primary texture.
    fn primary_source(&self) -> &[Picture] {
        match (&self.decoded.kind, &self.decoded.faces) {
            (ContainerKind::Cubemap, Some(faces)) => std::slice::from_ref(faces.get(CubeFace::PosZ)),
            (ContainerKind::Texture2D, _) => &self.decoded.layers,
            _ => &self.decoded.layers[..1],
        }
    }
}

/// Alternate composite: a contact strip for mipmapped 2D textures, a cross
/// for cubemaps, nothing otherwise.
fn build_alt(decoded: &DecodedImage) -> Option<Picture> {
    match decoded.kind {
        ContainerKind::Texture2D if decoded.layers.len() > 1 => Some(mip_strip(&decoded.layers)),
        ContainerKind::Cubemap => decoded.faces.as_ref().map(cube_cross),
        _ => None,
    }
}

/// An image file and everything derived from it.
///
/// `Image` lives on the thread that owns the texture backend. Only
/// [`read_container`] may run elsewhere; hand its result to
/// [`Image::load_prepared`].
pub struct Image {
    backend: SharedBackend,
    path: Option<PathBuf>,
    state: Option<LoadedState>,
    textures: TextureSlots,
    alt_enabled: bool,
}

impl Image {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            path: None,
            state: None,
            textures: TextureSlots::new(),
            alt_enabled: false,
        }
    }

    /// Remembers `path` without loading it.
    pub fn with_path(backend: SharedBackend, path: impl Into<PathBuf>) -> Self {
        let mut image = Self::new(backend);
        image.path = Some(path.into());
        image
    }

    /// Number of images currently loaded in this process.
    pub fn loaded_count() -> usize {
        LOADED_IMAGES.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads `path`, logging and returning `false` on failure.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_load_path(path) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to load image");
                false
            }
        }
    }

    /// Loads the remembered path, logging and returning `false` on failure.
    pub fn load(&mut self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(error) => {
                let path = self.path.as_deref().unwrap_or(Path::new(""));
                tracing::warn!(path = %path.display(), %error, "failed to load image");
                false
            }
        }
    }

    pub fn try_load_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ImageError::EmptyInput);
        }
        if self.path.as_deref() != Some(path) {
            self.unload();
            self.path = Some(path.to_path_buf());
        }
        self.try_load()
    }

    /// Loads the remembered path. Already loaded images return immediately.
    pub fn try_load(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let path = self
            .path
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ImageError::EmptyInput)?;
        let container = read_container(&path)?;
        self.finish_load(&path, container)
    }

    /// Completes a load whose CPU decode ran elsewhere.
    pub fn load_prepared(&mut self, path: impl AsRef<Path>, container: DecodedContainer) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ImageError::EmptyInput);
        }
        self.unload();
        self.path = Some(path.to_path_buf());
        self.finish_load(path, container)
    }

    fn finish_load(&mut self, path: &Path, container: DecodedContainer) -> Result<()> {
        let size_bytes = std::fs::metadata(path)
            .map(|metadata| metadata.len())
            .map_err(|source| ImageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let decoded = resolve(container, &self.backend).map_err(|error| match error {
            ImageError::Decode { reason, .. } => ImageError::decode(path, reason),
            other => other,
        })?;
        let state = LoadedState::new(decoded, size_bytes)?;

        tracing::debug!(
            path = %path.display(),
            container = %state.info.container,
            format = %state.info.pixel_format,
            width = state.info.width,
            height = state.info.height,
            mipmaps = state.info.mipmaps,
            "loaded image"
        );
        self.state = Some(state);
        LOADED_IMAGES.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Releases textures and decoded data. The remembered path survives, so
    /// a later [`Image::load`] rebuilds the same state.
    pub fn unload(&mut self) {
        self.textures.release();
        if self.state.take().is_some() {
            LOADED_IMAGES.fetch_sub(1, Ordering::SeqCst);
        }
        self.alt_enabled = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Binds the active representation and returns its texture.
    pub fn bind(&mut self) -> Result<TextureId> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| ImageError::gpu("cannot bind an image that is not loaded"))?;

        match (&state.alt, self.alt_enabled) {
            (Some(alt), true) => {
                self.textures
                    .bind(&self.backend, Selector::Alternate, &[alt.as_level()])
            }
            _ => {
                let levels: Vec<Level<'_>> =
                    state.primary_source().iter().map(Picture::as_level).collect();
                self.textures.bind(&self.backend, Selector::Primary, &levels)
            }
        }
    }

    /// Releases GPU textures but keeps the decoded data.
    pub fn unbind(&mut self) {
        self.textures.release();
    }

    /// Texture currently serving the active representation, if bound.
    pub fn texture_id(&self) -> Option<TextureId> {
        if self.showing_alt() {
            self.textures.id(Selector::Alternate)
        } else {
            self.textures.id(Selector::Primary)
        }
    }

    fn showing_alt(&self) -> bool {
        self.alt_enabled && self.alt_image().is_some()
    }

    /// Picture the accessors report on: the alternate composite when it is
    /// enabled and present, otherwise the first layer.
    fn active_picture(&self) -> Option<&Picture> {
        let state = self.state.as_ref()?;
        match (&state.alt, self.alt_enabled) {
            (Some(alt), true) => Some(alt),
            _ => state.decoded.layers.first(),
        }
    }

    pub fn width(&self) -> u32 {
        self.active_picture().map(Picture::width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.active_picture().map(Picture::height).unwrap_or(0)
    }

    /// Pixel of the active representation; opaque black when unloaded or
    /// out of range.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        self.active_picture()
            .and_then(|picture| picture.pixel(x, y))
            .unwrap_or(DEFAULT_PIXEL)
    }

    pub fn is_opaque(&self) -> bool {
        self.state
            .as_ref()
            .map(|state| state.info.opaque)
            .unwrap_or(true)
    }

    pub fn info(&self) -> Option<&ImageInfo> {
        self.state.as_ref().map(|state| &state.info)
    }

    pub fn loaded_at(&self) -> Option<DateTime<Local>> {
        self.info().map(|info| info.loaded_at)
    }

    /// Decoded layers: the flat picture, the mip chain, or the cube faces in
    /// display order.
    pub fn layers(&self) -> &[Picture] {
        self.state
            .as_ref()
            .map(|state| state.decoded.layers.as_slice())
            .unwrap_or(&[])
    }

    pub fn alt_image(&self) -> Option<&Picture> {
        self.state.as_ref().and_then(|state| state.alt.as_ref())
    }

    pub fn has_alt_image(&self) -> bool {
        self.alt_image().is_some()
    }

    pub fn alt_image_enabled(&self) -> bool {
        self.alt_enabled
    }

    pub fn set_alt_image_enabled(&mut self, enabled: bool) {
        self.alt_enabled = enabled;
    }

    /// Logs a one-line summary of the loaded image.
    pub fn log_info(&self) {
        let Some(info) = self.info() else {
            return;
        };
        let name = self
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(
            image = %name,
            width = info.width,
            height = info.height,
            pixel_format = %info.pixel_format,
            "image info"
        );
    }

    pub fn rotate90(&mut self, anticlockwise: bool) {
        self.transform(|picture| picture.rotate90(anticlockwise));
    }

    pub fn flip(&mut self, horizontal: bool) {
        self.transform(|picture| picture.flip(horizontal));
    }

    fn transform(&mut self, mut apply: impl FnMut(&mut Picture)) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let decoded = &mut state.decoded;
        decoded.layers.iter_mut().for_each(&mut apply);
        if let Some(faces) = decoded.faces.take() {
            decoded.faces = Some(faces.map(|_, mut picture| {
                apply(&mut picture);
                picture
            }));
        }
        state.alt = build_alt(decoded);
        if let Some(first) = decoded.layers.first() {
            state.info.width = first.width();
            state.info.height = first.height();
        }
        self.textures.release();
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("backend", &self.backend.name())
            .field("path", &self.path)
            .field("info", &self.info())
            .field("alt_enabled", &self.alt_enabled)
            .finish()
    }
}
