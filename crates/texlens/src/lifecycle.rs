use crate::backend::{GpuTexture, SharedBackend, TextureId};
use crate::error::Result;
use crate::layer::Level;
use crate::upload::upload_levels;

/// Which of an image's two textures to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Primary,
    Alternate,
}

/// Lazily created primary and alternate textures of one image.
#[derive(Debug, Default)]
pub struct TextureSlots {
    primary: Option<GpuTexture>,
    alternate: Option<GpuTexture>,
}

impl TextureSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, selector: Selector) -> &mut Option<GpuTexture> {
        match selector {
            Selector::Primary => &mut self.primary,
            Selector::Alternate => &mut self.alternate,
        }
    }

    /// Returns the cached texture for `selector`, uploading `levels` into a
    /// fresh one on first use.
    pub fn bind(
        &mut self,
        backend: &SharedBackend,
        selector: Selector,
        levels: &[Level<'_>],
    ) -> Result<TextureId> {
        let slot = self.slot(selector);
        if let Some(texture) = slot {
            return Ok(texture.id());
        }

        let texture = GpuTexture::create(backend)?;
        upload_levels(texture.backend(), texture.id(), levels)?;
        let id = texture.id();
        tracing::debug!(%id, ?selector, levels = levels.len(), "bound texture");
        *slot = Some(texture);
        Ok(id)
    }

    pub fn id(&self, selector: Selector) -> Option<TextureId> {
        match selector {
            Selector::Primary => self.primary.as_ref().map(GpuTexture::id),
            Selector::Alternate => self.alternate.as_ref().map(GpuTexture::id),
        }
    }

    /// Drops both textures. Safe to call at any time.
    pub fn release(&mut self) {
        self.primary = None;
        self.alternate = None;
    }
}
