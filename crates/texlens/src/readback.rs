//! GPU round trip for layers whose pixels are only decodable on the GPU.

use crate::backend::{GpuTexture, SharedBackend};
use crate::error::{ImageError, Result};
use crate::layer::Layer;
use crate::picture::Picture;
use crate::upload::upload_levels;

/// Uploads `layer` into a scratch texture and reads it back as RGBA8.
///
/// The scratch texture is released before returning, on success or failure.
pub fn readback_layer(backend: &SharedBackend, layer: &Layer) -> Result<Picture> {
    let scratch = GpuTexture::create(backend)?;
    upload_levels(scratch.backend(), scratch.id(), &[layer.as_level()])?;
    let texels = scratch.backend().read_level_rgba8(scratch.id(), 0)?;
    drop(scratch);

    Picture::from_rgba8(layer.width, layer.height, texels, layer.format.bit_depth()).ok_or_else(
        || {
            ImageError::gpu(format!(
                "readback of {}x{} {} returned a short buffer",
                layer.width, layer.height, layer.format
            ))
        },
    )
}

/// Reads back every level of a chain, finest first.
pub fn readback_chain(backend: &SharedBackend, layers: &[Layer]) -> Result<Vec<Picture>> {
    layers
        .iter()
        .map(|layer| readback_layer(backend, layer))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use image::Rgba;

    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::format::PixelFormat;

    fn bc1_solid(colour: u16, width: u32, height: u32) -> Layer {
        let blocks = (width.div_ceil(4) * height.div_ceil(4)) as usize;
        let mut data = Vec::with_capacity(blocks * 8);
        for _ in 0..blocks {
            data.extend_from_slice(&colour.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
        }
        Layer {
            format: PixelFormat::Bc1Dxt1,
            width,
            height,
            data,
        }
    }

    #[test]
    fn compressed_layer_reads_back_opaque() {
        let backend: SharedBackend = Rc::new(SoftwareBackend::new());
        let picture = readback_layer(&backend, &bc1_solid(0xf800, 4, 4)).unwrap();
        assert_eq!((picture.width(), picture.height()), (4, 4));
        assert_eq!(picture.pixel(3, 3), Some(Rgba([255, 0, 0, 255])));
        assert!(picture.is_opaque());
        assert_eq!(picture.src_bit_depth(), None);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn chain_reads_each_level_and_leaves_no_scratch() {
        let backend: SharedBackend = Rc::new(SoftwareBackend::new());
        let chain = [bc1_solid(0x001f, 8, 8), bc1_solid(0x07e0, 4, 4), bc1_solid(0, 2, 2)];
        let pictures = readback_chain(&backend, &chain).unwrap();
        let sizes: Vec<_> = pictures.iter().map(|p| (p.width(), p.height())).collect();
        assert_eq!(sizes, vec![(8, 8), (4, 4), (2, 2)]);
        assert_eq!(pictures[1].pixel(0, 0), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn failed_upload_still_releases_scratch() {
        let backend: SharedBackend = Rc::new(SoftwareBackend::new());
        let mut layer = bc1_solid(0, 8, 8);
        layer.data.truncate(8);
        assert!(readback_layer(&backend, &layer).is_err());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn uncompressed_layers_keep_their_depth() {
        let backend: SharedBackend = Rc::new(SoftwareBackend::new());
        let layer = Layer {
            format: PixelFormat::G3B5R5G3,
            width: 1,
            height: 1,
            data: (0x1fu16 << 11).to_le_bytes().to_vec(),
        };
        let picture = readback_layer(&backend, &layer).unwrap();
        assert_eq!(picture.src_bit_depth(), Some(16));
        assert_eq!(picture.pixel(0, 0), Some(Rgba([255, 0, 0, 255])));
    }
}
