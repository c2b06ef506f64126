//! Pixel encodings and the table that maps each one onto GPU upload parameters.
//!
//! Every uploader and readback path goes through [`upload_params`]; nothing
//! else switches on the pixel format to pick upload arguments.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{ImageError, Result};

/// Closed set of encodings the decoders can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// Recognised identifier without a GPU mapping.
    Invalid = 0,
    R8G8B8,
    R8G8B8A8,
    B8G8R8,
    B8G8R8A8,
    /// 16-bit packed 5-5-5-1, stored as little-endian `ARRRRRGGGGGBBBBB`.
    G3B5A1R5G2,
    /// 16-bit packed 4-4-4-4, stored as little-endian `AAAARRRRGGGGBBBB`.
    G4B4A4R4,
    /// 16-bit packed 5-6-5, stored as little-endian `RRRRRGGGGGGBBBBB`.
    G3B5R5G3,
    Bc1Dxt1,
    /// BC1 with the one-bit alpha mode honoured.
    Bc1Dxt1a,
    Bc2Dxt3,
    Bc3Dxt5,
}

impl PixelFormat {
    pub const COUNT: usize = 12;

    pub const ALL: [PixelFormat; Self::COUNT] = [
        PixelFormat::Invalid,
        PixelFormat::R8G8B8,
        PixelFormat::R8G8B8A8,
        PixelFormat::B8G8R8,
        PixelFormat::B8G8R8A8,
        PixelFormat::G3B5A1R5G2,
        PixelFormat::G4B4A4R4,
        PixelFormat::G3B5R5G3,
        PixelFormat::Bc1Dxt1,
        PixelFormat::Bc1Dxt1a,
        PixelFormat::Bc2Dxt3,
        PixelFormat::Bc3Dxt5,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Invalid => "Invalid",
            PixelFormat::R8G8B8 => "R8G8B8",
            PixelFormat::R8G8B8A8 => "R8G8B8A8",
            PixelFormat::B8G8R8 => "B8G8R8",
            PixelFormat::B8G8R8A8 => "B8G8R8A8",
            PixelFormat::G3B5A1R5G2 => "G3B5A1R5G2",
            PixelFormat::G4B4A4R4 => "G4B4A4R4",
            PixelFormat::G3B5R5G3 => "G3B5R5G3",
            PixelFormat::Bc1Dxt1 => "BC1DXT1",
            PixelFormat::Bc1Dxt1a => "BC1DXT1A",
            PixelFormat::Bc2Dxt3 => "BC2DXT3",
            PixelFormat::Bc3Dxt5 => "BC3DXT5",
        }
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(
            self,
            PixelFormat::Bc1Dxt1
                | PixelFormat::Bc1Dxt1a
                | PixelFormat::Bc2Dxt3
                | PixelFormat::Bc3Dxt5
        )
    }

    /// Bytes per pixel for uncompressed formats.
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            PixelFormat::R8G8B8 | PixelFormat::B8G8R8 => Some(3),
            PixelFormat::R8G8B8A8 | PixelFormat::B8G8R8A8 => Some(4),
            PixelFormat::G3B5A1R5G2 | PixelFormat::G4B4A4R4 | PixelFormat::G3B5R5G3 => Some(2),
            _ => None,
        }
    }

    /// Bytes per 4x4 block for block-compressed formats.
    pub fn block_bytes(self) -> Option<u32> {
        match self {
            PixelFormat::Bc1Dxt1 | PixelFormat::Bc1Dxt1a => Some(8),
            PixelFormat::Bc2Dxt3 | PixelFormat::Bc3Dxt5 => Some(16),
            _ => None,
        }
    }

    /// Bit depth as stored in the source file; block formats have none.
    pub fn bit_depth(self) -> Option<u32> {
        self.bytes_per_pixel().map(|bytes| bytes * 8)
    }

    /// Whether decoded texels may carry anything other than full opacity.
    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::R8G8B8A8
                | PixelFormat::B8G8R8A8
                | PixelFormat::G3B5A1R5G2
                | PixelFormat::G4B4A4R4
                | PixelFormat::Bc1Dxt1a
                | PixelFormat::Bc2Dxt3
                | PixelFormat::Bc3Dxt5
        )
    }

    /// Payload size of one level of `width` x `height` texels.
    pub fn level_size(self, width: u32, height: u32) -> Option<usize> {
        if let Some(bytes) = self.bytes_per_pixel() {
            return (width as usize)
                .checked_mul(height as usize)?
                .checked_mul(bytes as usize);
        }
        let block = self.block_bytes()?;
        let blocks_wide = width.div_ceil(4).max(1) as usize;
        let blocks_high = height.div_ceil(4).max(1) as usize;
        blocks_wide.checked_mul(blocks_high)?.checked_mul(block as usize)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for PixelFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Component order of uncompressed source texels; `Block` for compressed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOrder {
    Rgb,
    Rgba,
    Bgr,
    Bgra,
    Block,
}

/// Storage type of each source element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    UnsignedByte,
    /// One 16-bit word per texel, components packed in reverse order (B lowest).
    UnsignedShort1555Rev,
    UnsignedShort4444Rev,
    /// One 16-bit word per texel, R in the high bits.
    UnsignedShort565,
}

/// Storage the GPU keeps for the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestFormat {
    Rgb8,
    Rgba8,
    Rgb5A1,
    Rgba4,
    Rgb565,
    Bc1Rgb,
    Bc1Rgba,
    Bc2,
    Bc3,
}

impl DestFormat {
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            DestFormat::Bc1Rgb | DestFormat::Bc1Rgba | DestFormat::Bc2 | DestFormat::Bc3
        )
    }

    /// Storage that drops any alpha the source carried.
    pub fn is_opaque(self) -> bool {
        matches!(self, DestFormat::Rgb8 | DestFormat::Rgb565 | DestFormat::Bc1Rgb)
    }
}

/// Arguments for one level upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadParams {
    pub source_order: SourceOrder,
    pub source_type: SourceType,
    pub dest_format: DestFormat,
    pub compressed: bool,
}

const fn plain(order: SourceOrder, ty: SourceType, dest: DestFormat) -> Option<UploadParams> {
    Some(UploadParams {
        source_order: order,
        source_type: ty,
        dest_format: dest,
        compressed: false,
    })
}

const fn block(dest: DestFormat) -> Option<UploadParams> {
    Some(UploadParams {
        source_order: SourceOrder::Block,
        source_type: SourceType::UnsignedByte,
        dest_format: dest,
        compressed: true,
    })
}

/// Indexed by `PixelFormat as usize`.
const UPLOAD_TABLE: [Option<UploadParams>; PixelFormat::COUNT] = [
    None,
    plain(SourceOrder::Rgb, SourceType::UnsignedByte, DestFormat::Rgb8),
    plain(SourceOrder::Rgba, SourceType::UnsignedByte, DestFormat::Rgba8),
    plain(SourceOrder::Bgr, SourceType::UnsignedByte, DestFormat::Rgb8),
    plain(SourceOrder::Bgra, SourceType::UnsignedByte, DestFormat::Rgba8),
    plain(
        SourceOrder::Bgra,
        SourceType::UnsignedShort1555Rev,
        DestFormat::Rgb5A1,
    ),
    plain(
        SourceOrder::Bgra,
        SourceType::UnsignedShort4444Rev,
        DestFormat::Rgba4,
    ),
    plain(
        SourceOrder::Rgb,
        SourceType::UnsignedShort565,
        DestFormat::Rgb565,
    ),
    block(DestFormat::Bc1Rgb),
    block(DestFormat::Bc1Rgba),
    block(DestFormat::Bc2),
    block(DestFormat::Bc3),
];

/// Looks up the upload parameters for `format`.
pub fn upload_params(format: PixelFormat) -> Result<UploadParams> {
    UPLOAD_TABLE[format as usize].ok_or(ImageError::UnsupportedFormat(format))
}
