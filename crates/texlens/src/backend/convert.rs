use crate::error::{ImageError, Result};
use crate::format::{SourceOrder, SourceType, UploadParams};

/// Interprets uncompressed texels per their order/type and widens them to RGBA8.
pub(crate) fn expand_to_rgba8(
    params: &UploadParams,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<Vec<u8>> {
    if params.compressed {
        return Err(ImageError::gpu(
            "block-compressed data cannot be expanded on the upload path",
        ));
    }

    let texels = width as usize * height as usize;
    let stride = match params.source_type {
        SourceType::UnsignedByte => match params.source_order {
            SourceOrder::Rgb | SourceOrder::Bgr => 3,
            SourceOrder::Rgba | SourceOrder::Bgra => 4,
            SourceOrder::Block => {
                return Err(ImageError::gpu("block order requires compressed storage"))
            }
        },
        SourceType::UnsignedShort1555Rev
        | SourceType::UnsignedShort4444Rev
        | SourceType::UnsignedShort565 => 2,
    };
    if data.len() < texels * stride {
        return Err(ImageError::gpu(format!(
            "level payload holds {} bytes, {width}x{height} needs {}",
            data.len(),
            texels * stride
        )));
    }

    let mut out = Vec::with_capacity(texels * 4);
    for texel in data.chunks_exact(stride).take(texels) {
        let rgba = match params.source_type {
            SourceType::UnsignedByte => match params.source_order {
                SourceOrder::Rgb => [texel[0], texel[1], texel[2], u8::MAX],
                SourceOrder::Bgr => [texel[2], texel[1], texel[0], u8::MAX],
                SourceOrder::Rgba => [texel[0], texel[1], texel[2], texel[3]],
                SourceOrder::Bgra => [texel[2], texel[1], texel[0], texel[3]],
                SourceOrder::Block => unreachable!("rejected above"),
            },
            SourceType::UnsignedShort1555Rev => {
                let word = u16::from_le_bytes([texel[0], texel[1]]);
                [
                    widen5((word >> 10) & 0x1f),
                    widen5((word >> 5) & 0x1f),
                    widen5(word & 0x1f),
                    if word & 0x8000 != 0 { u8::MAX } else { 0 },
                ]
            }
            SourceType::UnsignedShort4444Rev => {
                let word = u16::from_le_bytes([texel[0], texel[1]]);
                [
                    widen4((word >> 8) & 0xf),
                    widen4((word >> 4) & 0xf),
                    widen4(word & 0xf),
                    widen4((word >> 12) & 0xf),
                ]
            }
            SourceType::UnsignedShort565 => {
                let word = u16::from_le_bytes([texel[0], texel[1]]);
                [
                    widen5((word >> 11) & 0x1f),
                    widen6((word >> 5) & 0x3f),
                    widen5(word & 0x1f),
                    u8::MAX,
                ]
            }
        };
        out.extend_from_slice(&rgba);
    }

    if params.dest_format.is_opaque() {
        for alpha in out.iter_mut().skip(3).step_by(4) {
            *alpha = u8::MAX;
        }
    }
    Ok(out)
}

fn widen4(value: u16) -> u8 {
    (value * 17) as u8
}

fn widen5(value: u16) -> u8 {
    ((value << 3) | (value >> 2)) as u8
}

fn widen6(value: u16) -> u8 {
    ((value << 2) | (value >> 4)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{upload_params, PixelFormat};

    fn expand(format: PixelFormat, data: &[u8]) -> Vec<u8> {
        let params = upload_params(format).unwrap();
        expand_to_rgba8(&params, 1, 1, data).unwrap()
    }

    #[test]
    fn swizzles_bgr_orders() {
        assert_eq!(expand(PixelFormat::B8G8R8, &[1, 2, 3]), [3, 2, 1, 255]);
        assert_eq!(expand(PixelFormat::B8G8R8A8, &[1, 2, 3, 4]), [3, 2, 1, 4]);
        assert_eq!(expand(PixelFormat::R8G8B8, &[1, 2, 3]), [1, 2, 3, 255]);
    }

    #[test]
    fn widens_packed_1555() {
        // A=1, R=31, G=0, B=0
        let word: u16 = 0x8000 | (0x1f << 10);
        assert_eq!(
            expand(PixelFormat::G3B5A1R5G2, &word.to_le_bytes()),
            [255, 0, 0, 255]
        );
        assert_eq!(expand(PixelFormat::G3B5A1R5G2, &[0x1f, 0x00]), [0, 0, 255, 0]);
    }

    #[test]
    fn widens_packed_4444() {
        // A=8, R=15, G=1, B=0
        let word: u16 = (0x8 << 12) | (0xf << 8) | (0x1 << 4);
        assert_eq!(
            expand(PixelFormat::G4B4A4R4, &word.to_le_bytes()),
            [255, 17, 0, 136]
        );
    }

    #[test]
    fn widens_packed_565() {
        let green: u16 = 0x3f << 5;
        assert_eq!(
            expand(PixelFormat::G3B5R5G3, &green.to_le_bytes()),
            [0, 255, 0, 255]
        );
        let mid: u16 = 0x10 << 11;
        assert_eq!(expand(PixelFormat::G3B5R5G3, &mid.to_le_bytes()), [132, 0, 0, 255]);
    }

    #[test]
    fn rejects_short_payloads_and_blocks() {
        let params = upload_params(PixelFormat::R8G8B8A8).unwrap();
        assert!(expand_to_rgba8(&params, 2, 2, &[0; 15]).is_err());
        let params = upload_params(PixelFormat::Bc1Dxt1).unwrap();
        assert!(expand_to_rgba8(&params, 4, 4, &[0; 8]).is_err());
    }
}
