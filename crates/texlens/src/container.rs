//! Container classification and decoding.
//!
//! Decoding runs in two steps. [`read_container`] parses the file on the CPU
//! and returns raw layers; it touches no GPU state and may run on a worker
//! thread. [`resolve`] then turns those layers into CPU-visible pictures,
//! using a GPU round trip for block-compressed data.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use ddsfile::{Caps2, D3DFormat, Dds, DxgiFormat, MiscFlag, PixelFormatFlags};
use image::ImageFormat;
use serde::Serialize;

use crate::backend::SharedBackend;
use crate::error::{ImageError, Result};
use crate::format::PixelFormat;
use crate::layer::{CubeFace, CubeFaces, Layer};
use crate::picture::Picture;
use crate::readback::{readback_chain, readback_layer};

const DDS_MAGIC: &[u8; 4] = b"DDS ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerKind {
    Flat,
    Texture2D,
    Cubemap,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerKind::Flat => "flat",
            ContainerKind::Texture2D => "texture2d",
            ContainerKind::Cubemap => "cubemap",
        })
    }
}

/// Output of the CPU decode step.
#[derive(Debug, Clone)]
pub enum DecodedContainer {
    Flat(Picture),
    /// Mip chain, finest first.
    Texture2D { layers: Vec<Layer> },
    /// Per-face mip chains.
    Cubemap { faces: CubeFaces<Vec<Layer>> },
}

impl DecodedContainer {
    pub fn kind(&self) -> ContainerKind {
        match self {
            DecodedContainer::Flat(_) => ContainerKind::Flat,
            DecodedContainer::Texture2D { .. } => ContainerKind::Texture2D,
            DecodedContainer::Cubemap { .. } => ContainerKind::Cubemap,
        }
    }
}

/// CPU-visible result of a load.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub kind: ContainerKind,
    /// Format reported to the user.
    pub format: PixelFormat,
    /// Flat picture, decoded mip chain, or the six faces in display order.
    pub layers: Vec<Picture>,
    pub faces: Option<CubeFaces<Picture>>,
    pub opaque: bool,
    pub src_bit_depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sniffed {
    Dds,
    Raster(ImageFormat),
}

/// Reads and decodes `path` without touching the GPU.
pub fn read_container(path: &Path) -> Result<DecodedContainer> {
    let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(ImageError::decode(path, "file is empty"));
    }

    match sniff(path, &bytes)? {
        Sniffed::Dds => read_dds(path, &bytes),
        Sniffed::Raster(format) => {
            let image = image::load_from_memory_with_format(&bytes, format)
                .map_err(|err| ImageError::decode(path, err.to_string()))?;
            Ok(DecodedContainer::Flat(Picture::from_dynamic(image)))
        }
    }
}

fn sniff(path: &Path, bytes: &[u8]) -> Result<Sniffed> {
    if bytes.starts_with(DDS_MAGIC) {
        return Ok(Sniffed::Dds);
    }
    if let Ok(format) = image::guess_format(bytes) {
        return Ok(Sniffed::Raster(format));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("dds") => Ok(Sniffed::Dds),
        Some(ext) => ImageFormat::from_extension(ext)
            .map(Sniffed::Raster)
            .ok_or_else(|| ImageError::decode(path, format!("unrecognised container '.{ext}'"))),
        None => Err(ImageError::decode(path, "unrecognised container")),
    }
}

fn read_dds(path: &Path, bytes: &[u8]) -> Result<DecodedContainer> {
    let dds = Dds::read(Cursor::new(bytes))
        .map_err(|err| ImageError::decode(path, format!("invalid DDS header: {err}")))?;

    match decode_texture_2d(path, &dds) {
        Ok(layers) => Ok(DecodedContainer::Texture2D { layers }),
        Err(not_2d) => match decode_cubemap(path, &dds)? {
            Some(faces) => Ok(DecodedContainer::Cubemap { faces }),
            None => Err(not_2d),
        },
    }
}

fn is_cubemap(dds: &Dds) -> bool {
    dds.header.caps2.contains(Caps2::CUBEMAP)
        || dds
            .header10
            .as_ref()
            .is_some_and(|h10| h10.misc_flag.contains(MiscFlag::TEXTURECUBE))
}

fn decode_texture_2d(path: &Path, dds: &Dds) -> Result<Vec<Layer>> {
    if is_cubemap(dds) {
        return Err(ImageError::decode(path, "cubemap, not a 2D texture"));
    }
    if dds.get_depth() > 1 {
        return Err(ImageError::decode(path, "volume textures are not supported"));
    }
    if dds.get_num_array_layers() > 1 {
        return Err(ImageError::decode(path, "texture arrays are not supported"));
    }

    let format = dds_pixel_format(path, dds)?;
    let (layers, _) = read_chain(path, dds, format, 0)?;
    Ok(layers)
}

/// `Ok(None)` when the file is not a cubemap at all.
fn decode_cubemap(path: &Path, dds: &Dds) -> Result<Option<CubeFaces<Vec<Layer>>>> {
    if !is_cubemap(dds) {
        return Ok(None);
    }
    if dds.header10.is_none() && !dds.header.caps2.contains(Caps2::CUBEMAP_ALLFACES) {
        return Err(ImageError::decode(path, "cubemap is missing faces"));
    }
    if dds.header10.as_ref().is_some_and(|h10| h10.array_size > 1) {
        return Err(ImageError::decode(path, "cubemap arrays are not supported"));
    }

    let format = dds_pixel_format(path, dds)?;
    let mut offset = 0;
    let faces = CubeFaces::try_from_fn(|face| {
        let (layers, next) = read_chain(path, dds, format, offset).map_err(|err| match err {
            ImageError::Decode { path, reason } => ImageError::Decode {
                path,
                reason: format!("{face:?} face: {reason}"),
            },
            other => other,
        })?;
        offset = next;
        Ok::<_, ImageError>(layers)
    })?;
    Ok(Some(faces))
}

/// Slices one mip chain out of the payload starting at `offset`; returns the
/// layers and the offset just past them.
fn read_chain(
    path: &Path,
    dds: &Dds,
    format: PixelFormat,
    mut offset: usize,
) -> Result<(Vec<Layer>, usize)> {
    let width = dds.get_width();
    let height = dds.get_height();
    if width == 0 || height == 0 {
        return Err(ImageError::decode(path, "zero-sized texture"));
    }
    // The header's mip count is untrusted; a chain never outlasts 1x1.
    let full_chain = u32::BITS - width.max(height).leading_zeros();
    let levels = dds.get_num_mipmap_levels().clamp(1, full_chain);

    let mut layers = Vec::with_capacity(levels as usize);
    for level in 0..levels {
        let level_width = (width >> level).max(1);
        let level_height = (height >> level).max(1);
        let size = format
            .level_size(level_width, level_height)
            .ok_or_else(|| ImageError::decode(path, format!("level {level} size overflows")))?;
        let end = offset
            .checked_add(size)
            .ok_or_else(|| ImageError::decode(path, "mip chain size overflows"))?;
        let data = dds.data.get(offset..end).ok_or_else(|| {
            ImageError::decode(
                path,
                format!(
                    "payload truncated at level {level} ({level_width}x{level_height}): needs {end} bytes, has {}",
                    dds.data.len()
                ),
            )
        })?;
        layers.push(Layer {
            format,
            width: level_width,
            height: level_height,
            data: data.to_vec(),
        });
        offset = end;
        if level_width == 1 && level_height == 1 {
            break;
        }
    }
    Ok((layers, offset))
}

fn dds_pixel_format(path: &Path, dds: &Dds) -> Result<PixelFormat> {
    let format = if let Some(h10) = &dds.header10 {
        match h10.dxgi_format {
            DxgiFormat::R8G8B8A8_UNorm => Some(PixelFormat::R8G8B8A8),
            DxgiFormat::B8G8R8A8_UNorm => Some(PixelFormat::B8G8R8A8),
            DxgiFormat::B5G6R5_UNorm => Some(PixelFormat::G3B5R5G3),
            DxgiFormat::B5G5R5A1_UNorm => Some(PixelFormat::G3B5A1R5G2),
            DxgiFormat::B4G4R4A4_UNorm => Some(PixelFormat::G4B4A4R4),
            DxgiFormat::BC1_UNorm => Some(PixelFormat::Bc1Dxt1),
            DxgiFormat::BC2_UNorm => Some(PixelFormat::Bc2Dxt3),
            DxgiFormat::BC3_UNorm => Some(PixelFormat::Bc3Dxt5),
            _ => None,
        }
    } else {
        match dds.get_d3d_format() {
            Some(D3DFormat::A8R8G8B8) => Some(PixelFormat::B8G8R8A8),
            Some(D3DFormat::A8B8G8R8) => Some(PixelFormat::R8G8B8A8),
            Some(D3DFormat::R8G8B8) => Some(PixelFormat::B8G8R8),
            Some(D3DFormat::A1R5G5B5) => Some(PixelFormat::G3B5A1R5G2),
            Some(D3DFormat::A4R4G4B4) => Some(PixelFormat::G4B4A4R4),
            Some(D3DFormat::R5G6B5) => Some(PixelFormat::G3B5R5G3),
            Some(D3DFormat::DXT1)
                if dds.header.spf.flags.contains(PixelFormatFlags::ALPHA_PIXELS) =>
            {
                Some(PixelFormat::Bc1Dxt1a)
            }
            Some(D3DFormat::DXT1) => Some(PixelFormat::Bc1Dxt1),
            Some(D3DFormat::DXT3) => Some(PixelFormat::Bc2Dxt3),
            Some(D3DFormat::DXT5) => Some(PixelFormat::Bc3Dxt5),
            _ => None,
        }
    };

    format.ok_or_else(|| {
        let described = match (&dds.header10, dds.get_d3d_format()) {
            (Some(h10), _) => format!("{:?}", h10.dxgi_format),
            (None, Some(d3d)) => format!("{d3d:?}"),
            (None, None) => format!("{:?}", dds.header.spf.fourcc),
        };
        ImageError::decode(path, format!("unsupported DDS pixel format {described}"))
    })
}

/// Turns decoded layers into CPU-visible pictures and metadata.
pub fn resolve(container: DecodedContainer, backend: &SharedBackend) -> Result<DecodedImage> {
    let kind = container.kind();
    match container {
        DecodedContainer::Flat(picture) => {
            let src_bit_depth = picture.src_bit_depth();
            let format = if src_bit_depth == Some(24) {
                PixelFormat::R8G8B8
            } else {
                PixelFormat::R8G8B8A8
            };
            Ok(DecodedImage {
                kind,
                format,
                opaque: picture.is_opaque(),
                layers: vec![picture],
                faces: None,
                src_bit_depth,
            })
        }
        DecodedContainer::Texture2D { layers } => {
            let format = layers
                .first()
                .map(|layer| layer.format)
                .ok_or_else(|| ImageError::gpu("2D texture has no levels"))?;
            let pictures = readback_chain(backend, &layers)?;
            let opaque = !format.has_alpha() || pictures.iter().all(Picture::is_opaque);
            Ok(DecodedImage {
                kind,
                format,
                layers: pictures,
                faces: None,
                opaque,
                src_bit_depth: format.bit_depth(),
            })
        }
        DecodedContainer::Cubemap { faces } => {
            let format = faces
                .get(CubeFace::PosX)
                .first()
                .map(|layer| layer.format)
                .ok_or_else(|| ImageError::gpu("cubemap face has no levels"))?;
            let pictures = CubeFaces::try_from_fn(|face| {
                let top = faces
                    .get(face)
                    .first()
                    .ok_or_else(|| ImageError::gpu(format!("{face:?} face has no levels")))?;
                readback_layer(backend, top)
            })?;
            let opaque =
                !format.has_alpha() || pictures.iter().all(|(_, picture)| picture.is_opaque());
            Ok(DecodedImage {
                kind,
                format,
                layers: pictures.clone().into_display_order(),
                faces: Some(pictures),
                opaque,
                src_bit_depth: format.bit_depth(),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs::File;
    use std::rc::Rc;

    use ddsfile::NewD3dParams;
    use image::{Rgb, RgbImage, Rgba};
    use tempfile::TempDir;

    use super::*;
    use crate::backend::SoftwareBackend;

    /// One solid BC1 block per 4x4 tile.
    pub(crate) fn bc1_payload(colour: u16, width: u32, height: u32) -> Vec<u8> {
        let blocks = (width.div_ceil(4) * height.div_ceil(4)) as usize;
        let mut data = Vec::with_capacity(blocks * 8);
        for _ in 0..blocks {
            data.extend_from_slice(&colour.to_le_bytes());
            data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        }
        data
    }

    pub(crate) fn bc1_chain(colour: u16, width: u32, height: u32, levels: u32) -> Vec<u8> {
        (0..levels)
            .flat_map(|level| bc1_payload(colour, (width >> level).max(1), (height >> level).max(1)))
            .collect()
    }

    pub(crate) fn write_dds(
        dir: &TempDir,
        name: &str,
        format: D3DFormat,
        size: u32,
        levels: u32,
        caps2: Option<Caps2>,
        data: Vec<u8>,
    ) -> std::path::PathBuf {
        let mut dds = Dds::new_d3d(NewD3dParams {
            height: size,
            width: size,
            depth: None,
            format,
            mipmap_levels: (levels > 1).then_some(levels),
            caps2,
        })
        .expect("dds header");
        dds.data = data;
        let path = dir.path().join(name);
        let mut file = File::create(&path).expect("create dds");
        dds.write(&mut file).expect("write dds");
        path
    }

    fn backend() -> SharedBackend {
        Rc::new(SoftwareBackend::new())
    }

    #[test]
    fn flat_png_reports_24_bit_rgb() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flat.png");
        RgbImage::from_pixel(3, 2, Rgb([9, 8, 7])).save(&path).unwrap();

        let container = read_container(&path).unwrap();
        assert_eq!(container.kind(), ContainerKind::Flat);
        let image = resolve(container, &backend()).unwrap();
        assert_eq!(image.format, PixelFormat::R8G8B8);
        assert_eq!(image.src_bit_depth, Some(24));
        assert!(image.opaque);
        assert_eq!(image.layers[0].pixel(2, 1), Some(Rgba([9, 8, 7, 255])));
    }

    #[test]
    fn content_wins_over_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mislabelled.dds");
        RgbImage::from_pixel(1, 1, Rgb([1, 2, 3])).save_with_format(&path, ImageFormat::Png).unwrap();
        assert_eq!(read_container(&path).unwrap().kind(), ContainerKind::Flat);
    }

    #[test]
    fn unknown_and_empty_files_are_decode_errors() {
        let dir = TempDir::new().unwrap();
        let junk = dir.path().join("junk.xyz");
        std::fs::write(&junk, b"not an image").unwrap();
        assert!(read_container(&junk).unwrap_err().is_decode());

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(read_container(&empty).unwrap_err().is_decode());

        let missing = dir.path().join("missing.png");
        assert!(matches!(read_container(&missing), Err(ImageError::Io { .. })));
    }

    #[test]
    fn mipmapped_dds_decodes_every_level() {
        let dir = TempDir::new().unwrap();
        let path = write_dds(
            &dir,
            "chain.dds",
            D3DFormat::DXT1,
            16,
            5,
            None,
            bc1_chain(0xf800, 16, 16, 5),
        );

        let container = read_container(&path).unwrap();
        let DecodedContainer::Texture2D { layers } = &container else {
            panic!("expected a 2D texture, got {:?}", container.kind());
        };
        let sizes: Vec<_> = layers.iter().map(|layer| layer.width).collect();
        assert_eq!(sizes, vec![16, 8, 4, 2, 1]);

        let backend = backend();
        let image = resolve(container, &backend).unwrap();
        assert_eq!(image.format, PixelFormat::Bc1Dxt1);
        assert_eq!(image.src_bit_depth, None);
        assert!(image.opaque);
        assert_eq!(image.layers.len(), 5);
        assert_eq!(image.layers[4].pixel(0, 0), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn truncated_dds_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut data = bc1_chain(0, 16, 16, 5);
        data.truncate(40);
        let path = write_dds(&dir, "short.dds", D3DFormat::DXT1, 16, 5, None, data);
        let err = read_container(&path).unwrap_err();
        assert!(err.is_decode(), "{err}");
    }

    fn patch_mip_count(path: &Path, count: u32) {
        let mut bytes = std::fs::read(path).unwrap();
        bytes[28..32].copy_from_slice(&count.to_le_bytes());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn absurd_mip_count_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        // Two declared levels so the header carries the mip count flag.
        let path = write_dds(&dir, "huge.dds", D3DFormat::DXT1, 4, 2, None, bc1_payload(0, 4, 4));
        patch_mip_count(&path, u32::MAX);
        let err = read_container(&path).unwrap_err();
        assert!(err.is_decode(), "{err}");
    }

    #[test]
    fn mip_count_is_capped_at_the_full_chain() {
        let dir = TempDir::new().unwrap();
        let path = write_dds(&dir, "capped.dds", D3DFormat::DXT1, 4, 3, None, bc1_chain(0, 4, 4, 3));
        patch_mip_count(&path, u32::MAX);
        match read_container(&path).unwrap() {
            DecodedContainer::Texture2D { layers } => {
                let sizes: Vec<_> = layers.iter().map(|layer| layer.width).collect();
                assert_eq!(sizes, vec![4, 2, 1]);
            }
            other => panic!("expected a 2D texture, got {:?}", other.kind()),
        }
    }

    #[test]
    fn cubemap_faces_are_keyed_by_face() {
        let dir = TempDir::new().unwrap();
        // Storage order +X -X +Y -Y +Z -Z, one distinct colour per face.
        let colours = [0xf800u16, 0x07e0, 0x001f, 0xffff, 0xffe0, 0x0000];
        let data: Vec<u8> = colours
            .iter()
            .flat_map(|&colour| bc1_payload(colour, 4, 4))
            .collect();
        let path = write_dds(
            &dir,
            "cube.dds",
            D3DFormat::DXT1,
            4,
            1,
            Some(Caps2::CUBEMAP | Caps2::CUBEMAP_ALLFACES),
            data,
        );

        let container = read_container(&path).unwrap();
        assert_eq!(container.kind(), ContainerKind::Cubemap);
        let image = resolve(container, &backend()).unwrap();
        assert_eq!(image.layers.len(), 6);
        // Display order starts with +Z.
        assert_eq!(image.layers[0].pixel(0, 0), Some(Rgba([255, 255, 0, 255])));
        let faces = image.faces.expect("cube faces");
        assert_eq!(faces.get(CubeFace::NegX).pixel(0, 0), Some(Rgba([0, 255, 0, 255])));
    }

    #[test]
    fn cubemap_missing_faces_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = write_dds(
            &dir,
            "partial.dds",
            D3DFormat::DXT1,
            4,
            1,
            Some(Caps2::CUBEMAP | Caps2::CUBEMAP_POSITIVEX),
            bc1_payload(0, 4, 4),
        );
        let err = read_container(&path).unwrap_err();
        assert!(err.to_string().contains("missing faces"), "{err}");
    }
}
