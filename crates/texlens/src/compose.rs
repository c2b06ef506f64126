//! Composites for textures that cannot be previewed as a single picture.

use crate::layer::{CubeFace, CubeFaces};
use crate::picture::Picture;

/// Lays a mip chain out left to right along the top edge.
///
/// The strip is as wide as all levels together and as tall as the first one.
pub fn mip_strip(levels: &[Picture]) -> Picture {
    let width = levels.iter().map(Picture::width).sum();
    let height = levels.first().map(Picture::height).unwrap_or(0);
    let mut strip = Picture::transparent(width, height);

    let mut origin_x = 0;
    for level in levels {
        strip.blit(level, origin_x, 0);
        origin_x += level.width();
    }
    strip
}

/// Unfolds the cube into a horizontal cross of `4w` x `3h`:
///
/// ```text
///         [+Y]
///   [-X]  [+Z]  [+X]  [-Z]
///         [-Y]
/// ```
///
/// Face sizes come from +Z; every face is expected to share them.
pub fn cube_cross(faces: &CubeFaces<Picture>) -> Picture {
    let w = faces.get(CubeFace::PosZ).width();
    let h = faces.get(CubeFace::PosZ).height();
    let mut cross = Picture::transparent(w * 4, h * 3);

    for (face, picture) in faces.iter() {
        let (x, y) = match face {
            CubeFace::PosZ => (w, h),
            CubeFace::NegZ => (3 * w, h),
            CubeFace::PosX => (2 * w, h),
            CubeFace::NegX => (0, h),
            CubeFace::PosY => (w, 2 * h),
            CubeFace::NegY => (w, 0),
        };
        cross.blit(picture, x, y);
    }
    cross
}
