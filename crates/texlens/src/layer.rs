use serde::Serialize;

use crate::format::PixelFormat;
use crate::picture::Picture;

/// One raw level as produced by a container decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Layer {
    pub fn as_level(&self) -> Level<'_> {
        Level {
            format: self.format,
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Borrowed view of one level handed to the uploader.
#[derive(Debug, Clone, Copy)]
pub struct Level<'a> {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

impl Picture {
    pub fn as_level(&self) -> Level<'_> {
        Level {
            format: self.format(),
            width: self.width(),
            height: self.height(),
            data: self.as_rgba8(),
        }
    }
}

/// Faces of a cube texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    /// Order in which DDS files store their faces.
    pub const STORAGE_ORDER: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Front face first; the order cubemap layer sets are presented in.
    pub const DISPLAY_ORDER: [CubeFace; 6] = [
        CubeFace::PosZ,
        CubeFace::NegZ,
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// One value per cube face, addressed by face rather than position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeFaces<T> {
    faces: [T; 6],
}

impl<T> CubeFaces<T> {
    pub fn from_fn(mut f: impl FnMut(CubeFace) -> T) -> Self {
        Self {
            faces: std::array::from_fn(|index| f(CubeFace::STORAGE_ORDER[index])),
        }
    }

    pub fn try_from_fn<E>(mut f: impl FnMut(CubeFace) -> Result<T, E>) -> Result<Self, E> {
        let mut values = Vec::with_capacity(6);
        for face in CubeFace::STORAGE_ORDER {
            values.push(f(face)?);
        }
        Ok(Self::from_storage_order(values).unwrap_or_else(|_| unreachable!()))
    }

    /// Builds from six values in [`CubeFace::STORAGE_ORDER`].
    pub fn from_storage_order(values: Vec<T>) -> Result<Self, Vec<T>> {
        let faces: [T; 6] = values.try_into()?;
        Ok(Self { faces })
    }

    /// Builds from six values in [`CubeFace::DISPLAY_ORDER`].
    pub fn from_display_order(values: Vec<T>) -> Result<Self, Vec<T>> {
        if values.len() != 6 {
            return Err(values);
        }
        let mut slots: [Option<T>; 6] = std::array::from_fn(|_| None);
        for (face, value) in CubeFace::DISPLAY_ORDER.into_iter().zip(values) {
            slots[face.index()] = Some(value);
        }
        Ok(Self {
            faces: slots.map(|slot| slot.unwrap_or_else(|| unreachable!())),
        })
    }

    pub fn get(&self, face: CubeFace) -> &T {
        &self.faces[face.index()]
    }

    pub fn map<U>(self, mut f: impl FnMut(CubeFace, T) -> U) -> CubeFaces<U> {
        let mut index = 0;
        CubeFaces {
            faces: self.faces.map(|value| {
                let face = CubeFace::STORAGE_ORDER[index];
                index += 1;
                f(face, value)
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CubeFace, &T)> {
        CubeFace::STORAGE_ORDER.into_iter().zip(self.faces.iter())
    }

    /// Consumes the faces, yielding them front face first.
    pub fn into_display_order(self) -> Vec<T> {
        let mut slots = self.faces.map(Some);
        CubeFace::DISPLAY_ORDER
            .into_iter()
            .filter_map(|face| slots[face.index()].take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_order_matches_discriminants() {
        for (index, face) in CubeFace::STORAGE_ORDER.into_iter().enumerate() {
            assert_eq!(face.index(), index);
        }
    }

    #[test]
    fn display_order_round_trips_by_face() {
        let faces = CubeFaces::from_fn(|face| face);
        let display = faces.clone().into_display_order();
        assert_eq!(display, CubeFace::DISPLAY_ORDER.to_vec());

        let rebuilt = CubeFaces::from_display_order(display).expect("six faces");
        assert_eq!(rebuilt, faces);
        assert_eq!(*rebuilt.get(CubeFace::NegY), CubeFace::NegY);
    }

    #[test]
    fn wrong_face_count_is_rejected() {
        assert!(CubeFaces::from_display_order(vec![1, 2, 3]).is_err());
        assert!(CubeFaces::from_storage_order(vec![1; 7]).is_err());
    }
}
