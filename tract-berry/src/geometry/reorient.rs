//! 翻转到 MNI 方向约定 (x 轴朝左为负, y / z 轴为正).

use super::{Affine, VolumeGeometry};
use crate::consts::VECTOR_COMPONENTS;
use ndarray::{Array4, Axis};

/// 各体素轴是否需要翻转.
///
/// 翻转是对合的: 同一个 `MniFlip` 作用两次即还原.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MniFlip {
    flipped: [bool; 3],
}

/// MNI 约定下仿射对角元的符号.
const MNI_SIGNS: [f64; 3] = [-1.0, 1.0, 1.0];

impl MniFlip {
    /// 根据仿射对角元的符号决定翻转哪些轴.
    pub fn from_affine(affine: &Affine) -> Self {
        let flipped = [0, 1, 2].map(|i| affine.diagonal_sign(i) * MNI_SIGNS[i] < 0.0);
        Self { flipped }
    }

    /// 按给定轴构造.
    #[inline]
    pub fn new(flipped: [bool; 3]) -> Self {
        Self { flipped }
    }

    /// 不翻转任何轴.
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    /// 是否不翻转任何轴?
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.flipped.iter().all(|f| !f)
    }

    /// 各轴的翻转标记.
    #[inline]
    pub fn flipped(&self) -> [bool; 3] {
        self.flipped
    }

    /// 翻转后的几何.
    pub fn apply_geometry(&self, geometry: &VolumeGeometry) -> VolumeGeometry {
        let shape = geometry.shape();
        let mut affine = *geometry.affine();
        for axis in self.axes() {
            affine = affine.flipped(axis, shape[axis]);
        }
        geometry.with_affine(affine)
    }

    /// 翻转 `(x, y, z, c)` 组织的数据.
    ///
    /// `vector` 为真时, 通道按 3 个一组视为向量, 被翻转轴对应的分量同时取反.
    pub fn apply(&self, data: Array4<f32>, vector: bool) -> Array4<f32> {
        if self.is_identity() {
            return data;
        }
        let mut data = data;
        for axis in self.axes() {
            data.invert_axis(Axis(axis));
            if vector {
                let c = data.len_of(Axis(3));
                for ch in (axis..c).step_by(VECTOR_COMPONENTS) {
                    data.index_axis_mut(Axis(3), ch).mapv_inplace(|v| -v);
                }
            }
        }
        data.as_standard_layout().into_owned()
    }

    fn axes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..3).filter(|i| self.flipped[*i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_affine() {
        let a = Affine::from_spacing([1.0; 3]).unwrap();
        assert_eq!(MniFlip::from_affine(&a).flipped(), [true, false, false]);
        let b = a.flipped(0, 4);
        assert!(MniFlip::from_affine(&b).is_identity());
    }

    #[test]
    fn test_apply_negates_vector_components() {
        let mut d = Array4::<f32>::zeros((3, 1, 1, 6));
        d[(0, 0, 0, 0)] = 1.0;
        d[(0, 0, 0, 1)] = 2.0;
        d[(0, 0, 0, 3)] = 3.0;
        let f = MniFlip::new([true, false, false]);
        let out = f.apply(d.clone(), true);
        assert_eq!(out[(2, 0, 0, 0)], -1.0);
        assert_eq!(out[(2, 0, 0, 1)], 2.0);
        assert_eq!(out[(2, 0, 0, 3)], -3.0);
        assert_eq!(f.apply(out, true), d);
    }

    #[test]
    fn test_geometry_keeps_world_position() {
        let g = VolumeGeometry::from_spacing([5, 4, 3], [2.0; 3]).unwrap();
        let f = MniFlip::from_affine(g.affine());
        let h = f.apply_geometry(&g);
        let w0 = g.affine().voxel_to_world([4.0, 1.0, 2.0]);
        let w1 = h.affine().voxel_to_world([0.0, 1.0, 2.0]);
        assert!(w0.iter().zip(w1.iter()).all(|(a, b)| (a - b).abs() < 1e-9));
        assert!(MniFlip::from_affine(h.affine()).is_identity());
    }}
