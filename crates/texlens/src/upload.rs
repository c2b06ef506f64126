use crate::backend::{Sampling, TextureBackend, TextureExtent, TextureId};
use crate::error::{ImageError, Result};
use crate::format::upload_params;
use crate::layer::Level;

/// Uploads a mip chain (finest level first) into `id`.
///
/// Every level is validated before the backend is touched, so a rejected
/// chain leaves the handle exactly as it was. An empty chain is a no-op.
pub fn upload_levels(backend: &dyn TextureBackend, id: TextureId, levels: &[Level<'_>]) -> Result<()> {
    let Some(first) = levels.first() else {
        return Ok(());
    };

    let params = upload_params(first.format)?;
    let extent = TextureExtent {
        width: first.width,
        height: first.height,
        mip_levels: u32::try_from(levels.len())
            .map_err(|_| ImageError::gpu(format!("{} mip levels is too many", levels.len())))?,
    };

    for (index, level) in levels.iter().enumerate() {
        if level.format != first.format {
            return Err(ImageError::gpu(format!(
                "level {index} is {} but the chain is {}",
                level.format, first.format
            )));
        }
        if level.width == 0 || level.height == 0 {
            return Err(ImageError::gpu(format!("level {index} has zero extent")));
        }
        let expected = extent.level_size(index as u32);
        if (level.width, level.height) != expected {
            return Err(ImageError::gpu(format!(
                "level {index} is {}x{}, expected {}x{}",
                level.width, level.height, expected.0, expected.1
            )));
        }
        let needed = level
            .format
            .level_size(level.width, level.height)
            .ok_or(ImageError::UnsupportedFormat(level.format))?;
        if level.data.len() < needed {
            return Err(ImageError::gpu(format!(
                "level {index} holds {} bytes, {} needs {needed}",
                level.data.len(),
                level.format
            )));
        }
    }

    backend.define_storage(id, extent, params.dest_format)?;
    backend.set_sampling(id, Sampling::for_levels(levels.len()))?;
    for (index, level) in levels.iter().enumerate() {
        backend.write_level(
            id,
            index as u32,
            level.width,
            level.height,
            &params,
            level.data,
        )?;
    }

    tracing::trace!(
        %id,
        format = %first.format,
        levels = levels.len(),
        width = first.width,
        height = first.height,
        "uploaded texture"
    );
    Ok(())
}
