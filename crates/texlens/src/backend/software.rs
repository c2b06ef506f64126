use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::error::{ImageError, Result};
use crate::format::{DestFormat, UploadParams};

use super::blocks::decode_blocks;
use super::{expand_to_rgba8, Sampling, TextureBackend, TextureExtent, TextureId};

/// CPU emulation of the texture contract.
///
/// Levels are decoded at upload time and kept as RGBA8, which is exactly what
/// a GPU readback would return.
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    next_id: Cell<u64>,
    texture_limit: Option<usize>,
    slots: RefCell<HashMap<TextureId, Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    storage: Option<Storage>,
    sampling: Option<Sampling>,
}

#[derive(Debug)]
struct Storage {
    extent: TextureExtent,
    dest: DestFormat,
    levels: Vec<Option<Vec<u8>>>,
}

/// State of one software texture, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureState {
    pub extent: Option<TextureExtent>,
    pub dest: Option<DestFormat>,
    pub sampling: Option<Sampling>,
    pub levels_written: usize,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses to allocate more than `limit` live textures.
    pub fn with_texture_limit(limit: usize) -> Self {
        Self {
            texture_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn texture_state(&self, id: TextureId) -> Option<TextureState> {
        let slots = self.slots.borrow();
        let slot = slots.get(&id)?;
        Some(TextureState {
            extent: slot.storage.as_ref().map(|storage| storage.extent),
            dest: slot.storage.as_ref().map(|storage| storage.dest),
            sampling: slot.sampling,
            levels_written: slot
                .storage
                .as_ref()
                .map(|storage| storage.levels.iter().flatten().count())
                .unwrap_or(0),
        })
    }

    fn with_slot<T>(&self, id: TextureId, f: impl FnOnce(&mut Slot) -> Result<T>) -> Result<T> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .get_mut(&id)
            .ok_or_else(|| ImageError::gpu(format!("{id} is not a live texture")))?;
        f(slot)
    }
}

impl TextureBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_texture(&self) -> Result<TextureId> {
        if let Some(limit) = self.texture_limit {
            if self.live_textures() >= limit {
                return Err(ImageError::gpu(format!(
                    "software texture limit of {limit} reached"
                )));
            }
        }
        let raw = self.next_id.get() + 1;
        self.next_id.set(raw);
        let id = TextureId::new(NonZeroU64::new(raw).ok_or_else(|| ImageError::gpu("texture ids exhausted"))?);
        self.slots.borrow_mut().insert(id, Slot::default());
        Ok(id)
    }

    fn define_storage(&self, id: TextureId, extent: TextureExtent, dest: DestFormat) -> Result<()> {
        if extent.width == 0 || extent.height == 0 || extent.mip_levels == 0 {
            return Err(ImageError::gpu(format!(
                "cannot define empty storage {}x{} with {} levels",
                extent.width, extent.height, extent.mip_levels
            )));
        }
        self.with_slot(id, |slot| {
            slot.storage = Some(Storage {
                extent,
                dest,
                levels: vec![None; extent.mip_levels as usize],
            });
            Ok(())
        })
    }

    fn set_sampling(&self, id: TextureId, sampling: Sampling) -> Result<()> {
        self.with_slot(id, |slot| {
            slot.sampling = Some(sampling);
            Ok(())
        })
    }

    fn write_level(
        &self,
        id: TextureId,
        level: u32,
        width: u32,
        height: u32,
        params: &UploadParams,
        data: &[u8],
    ) -> Result<()> {
        self.with_slot(id, |slot| {
            let storage = slot
                .storage
                .as_mut()
                .ok_or_else(|| ImageError::gpu(format!("{id} has no storage defined")))?;
            if level >= storage.extent.mip_levels {
                return Err(ImageError::gpu(format!(
                    "level {level} outside the {} defined for {id}",
                    storage.extent.mip_levels
                )));
            }
            if storage.extent.level_size(level) != (width, height) {
                return Err(ImageError::gpu(format!(
                    "level {level} of {id} is {:?}, upload is {width}x{height}",
                    storage.extent.level_size(level)
                )));
            }
            if params.dest_format != storage.dest {
                return Err(ImageError::gpu(format!(
                    "upload targets {:?} but {id} stores {:?}",
                    params.dest_format, storage.dest
                )));
            }

            let texels = if params.compressed {
                decode_blocks(storage.dest, width, height, data)?
            } else {
                expand_to_rgba8(params, width, height, data)?
            };
            storage.levels[level as usize] = Some(texels);
            Ok(())
        })
    }

    fn read_level_rgba8(&self, id: TextureId, level: u32) -> Result<Vec<u8>> {
        self.with_slot(id, |slot| {
            slot.storage
                .as_ref()
                .and_then(|storage| storage.levels.get(level as usize))
                .and_then(|texels| texels.clone())
                .ok_or_else(|| ImageError::gpu(format!("level {level} of {id} was never written")))
        })
    }

    fn delete_texture(&self, id: TextureId) {
        self.slots.borrow_mut().remove(&id);
    }

    fn live_textures(&self) -> usize {
        self.slots.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{upload_params, PixelFormat};

    #[test]
    fn ids_are_unique_and_deletion_is_idempotent() {
        let backend = SoftwareBackend::new();
        let a = backend.create_texture().unwrap();
        let b = backend.create_texture().unwrap();
        assert_ne!(a, b);
        backend.delete_texture(a);
        backend.delete_texture(a);
        assert_eq!(backend.live_textures(), 1);
    }

    #[test]
    fn limit_refuses_extra_allocations() {
        let backend = SoftwareBackend::with_texture_limit(1);
        let first = backend.create_texture().unwrap();
        assert!(matches!(
            backend.create_texture(),
            Err(ImageError::GpuResource(_))
        ));
        backend.delete_texture(first);
        assert!(backend.create_texture().is_ok());
    }

    #[test]
    fn writes_require_matching_storage() {
        let backend = SoftwareBackend::new();
        let id = backend.create_texture().unwrap();
        let params = upload_params(PixelFormat::R8G8B8A8).unwrap();
        assert!(backend.write_level(id, 0, 1, 1, &params, &[1, 2, 3, 4]).is_err());

        let extent = TextureExtent {
            width: 2,
            height: 2,
            mip_levels: 2,
        };
        backend.define_storage(id, extent, DestFormat::Rgba8).unwrap();
        assert!(backend.write_level(id, 1, 2, 2, &params, &[0; 16]).is_err());
        backend.write_level(id, 1, 1, 1, &params, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.read_level_rgba8(id, 1).unwrap(), vec![1, 2, 3, 4]);
        assert!(backend.read_level_rgba8(id, 0).is_err());
    }
}
