//! The input cube-map LOD pyramid.

use cubeuv_layout::constants::MIN_MIP_CHAIN_FACE_SIZE;

use crate::encoding::CubeTextureInfo;
use crate::error::ConfigurationError;

/// One level of the pyramid: a cube map and its face width.
#[derive(Debug, Clone)]
pub struct CubeLod<C> {
    pub texture: C,
    pub face_size: u32,
}

/// Cube maps ordered from the base (largest) LOD down, each half the width of
/// the one before it. Once the pyramid reaches the 16 px floor a level may
/// repeat the previous width.
#[derive(Debug, Clone)]
pub struct CubeLodSet<C> {
    lods: Vec<CubeLod<C>>,
    info: CubeTextureInfo,
}

impl<C> CubeLodSet<C> {
    /// Validate and wrap a LOD pyramid.
    pub fn new(lods: Vec<CubeLod<C>>, info: CubeTextureInfo) -> Result<Self, ConfigurationError> {
        let Some(base) = lods.first() else {
            return Err(ConfigurationError::EmptyLodSet);
        };
        let mut previous = base.face_size;
        for (index, lod) in lods.iter().enumerate().skip(1) {
            let expected = previous / 2;
            let repeats_floor = previous <= MIN_MIP_CHAIN_FACE_SIZE && lod.face_size == previous;
            if lod.face_size != expected && !repeats_floor {
                return Err(ConfigurationError::NonHalvingLod {
                    index,
                    expected,
                    actual: lod.face_size,
                });
            }
            previous = lod.face_size;
        }
        Ok(Self { lods, info })
    }

    /// Face width of LOD 0.
    pub fn base_face_size(&self) -> u32 {
        self.lods[0].face_size
    }

    pub fn len(&self) -> usize {
        self.lods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lods.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CubeLod<C>> {
        self.lods.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CubeLod<C>> {
        self.lods.iter()
    }

    /// Metadata shared by every level.
    pub fn info(&self) -> &CubeTextureInfo {
        &self.info
    }
}
