//! 集成测试共用的合成数据.

#![allow(dead_code)]

use ndarray::{s, Array3, Array4, ArrayView3};
use tract_berry::geometry::Affine;
use tract_berry::volume::{BundleEndpoints, BundleMask, BundleTom};
use tract_berry::Point3;

/// 沿 x 轴的直管纤维束.
pub struct Tube {
    pub tom: BundleTom,
    pub mask: BundleMask,
    pub endings: BundleEndpoints,
}

/// 形状 `(len, 9, 9)`, 截面为 `[3, 6) x [3, 6)`. 起点掩膜为前两层, 终点掩膜为后两层.
pub fn tube(name: &str, len: usize) -> Tube {
    let shape = (len, 9, 9);
    let mut m = Array3::<bool>::default(shape);
    m.slice_mut(s![.., 3..6, 3..6]).fill(true);

    let mut field = Array4::<f32>::zeros((len, 9, 9, 3));
    field.slice_mut(s![.., 3..6, 3..6, 0]).fill(1.0);

    let mut start = Array3::<bool>::default(shape);
    start.slice_mut(s![0..2, 3..6, 3..6]).fill(true);
    let mut end = Array3::<bool>::default(shape);
    end.slice_mut(s![len - 2.., 3..6, 3..6]).fill(true);

    Tube {
        tom: BundleTom::new(name, field).unwrap(),
        mask: BundleMask::new(name, m),
        endings: BundleEndpoints::new(name, start, end).unwrap(),
    }
}

/// 端点掩膜与纤维束掩膜远离的纤维束. 任何纤维都无法通过端点过滤.
pub fn stray(name: &str, len: usize) -> Tube {
    let t = tube(name, len);
    let shape = (len, 9, 9);
    let mut far = Array3::<bool>::default(shape);
    far.slice_mut(s![.., 0..1, 0..1]).fill(true);
    Tube {
        endings: BundleEndpoints::symmetric(name, far),
        ..t
    }
}

/// 体素大小 2 mm, 原点平移.
pub fn affine() -> Affine {
    Affine::from_rows([
        [2.0, 0.0, 0.0, -10.0],
        [0.0, 2.0, 0.0, 5.0],
        [0.0, 0.0, 2.0, 1.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
    .unwrap()
}

/// 体素 `i` 覆盖 `[i - 0.5, i + 0.5)`.
pub fn voxel_of(p: Point3, mask: ArrayView3<bool>) -> Option<(usize, usize, usize)> {
    let (a, b, c) = mask.dim();
    let v = p.map(|c| (c + 0.5).floor());
    if v.iter().any(|c| !c.is_finite() || *c < 0.0) {
        return None;
    }
    let [x, y, z] = v.map(|c| c as usize);
    (x < a && y < b && z < c).then_some((x, y, z))
}

/// 世界坐标点是否落在 `mask` 内.
pub fn world_in_mask(affine: &Affine, p: Point3, mask: ArrayView3<bool>) -> bool {
    voxel_of(affine.world_to_voxel(p), mask).map_or(false, |v| mask[v])
}
