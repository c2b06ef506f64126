//! CPU decoding of BC1/BC2/BC3 surfaces for the software backend and the
//! wgpu fallback path. Blocks go through `bcdec_rs`.

use crate::error::{ImageError, Result};
use crate::format::DestFormat;

/// Bytes per decoded row of one 4x4 block.
const BLOCK_PITCH: usize = 4 * 4;

pub(crate) fn decode_blocks(dest: DestFormat, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let block_bytes = match dest {
        DestFormat::Bc1Rgb | DestFormat::Bc1Rgba => 8,
        DestFormat::Bc2 | DestFormat::Bc3 => 16,
        other => {
            return Err(ImageError::gpu(format!(
                "{other:?} storage is not block compressed"
            )))
        }
    };

    let blocks_wide = width.div_ceil(4).max(1) as usize;
    let blocks_high = height.div_ceil(4).max(1) as usize;
    if data.len() < blocks_wide * blocks_high * block_bytes {
        return Err(ImageError::gpu(format!(
            "compressed payload holds {} bytes, {width}x{height} needs {}",
            data.len(),
            blocks_wide * blocks_high * block_bytes
        )));
    }

    let decode: fn(&[u8], &mut [u8], usize) = match dest {
        DestFormat::Bc1Rgb | DestFormat::Bc1Rgba => bcdec_rs::bc1,
        DestFormat::Bc2 => bcdec_rs::bc2,
        _ => bcdec_rs::bc3,
    };

    let (width, height) = (width as usize, height as usize);
    let mut out = vec![0u8; width * height * 4];
    let mut texels = [0u8; BLOCK_PITCH * 4];
    for (index, block) in data
        .chunks_exact(block_bytes)
        .take(blocks_wide * blocks_high)
        .enumerate()
    {
        decode(block, &mut texels, BLOCK_PITCH);
        if dest == DestFormat::Bc1Rgb {
            // Opaque BC1 samples the transparent index as black.
            texels.chunks_exact_mut(4).for_each(|texel| texel[3] = u8::MAX);
        }

        let origin_x = (index % blocks_wide) * 4;
        let origin_y = (index / blocks_wide) * 4;
        for row in 0..4 {
            let y = origin_y + row;
            if y >= height {
                break;
            }
            let columns = 4usize.min(width.saturating_sub(origin_x));
            let src = &texels[row * BLOCK_PITCH..row * BLOCK_PITCH + columns * 4];
            let offset = (y * width + origin_x) * 4;
            out[offset..offset + columns * 4].copy_from_slice(src);
        }
    }
    Ok(out)
}
