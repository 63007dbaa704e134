//! 纤维过滤: 端点约束 + 全程掩膜约束.

use crate::{Idx3d, Point3};
use ndarray::ArrayView3;

/// 体素坐标 `p` 所在的体素. 体素 `i` 覆盖 `[i - 0.5, i + 0.5)`. 落在 `shape` 外时返回 `None`.
#[inline]
pub(crate) fn voxel_of(p: Point3, shape: [usize; 3]) -> Option<Idx3d> {
    let mut idx = [0usize; 3];
    for i in 0..3 {
        let v = (p[i] + 0.5).floor();
        if !(v >= 0.0 && v < shape[i] as f64) {
            return None;
        }
        idx[i] = v as usize;
    }
    Some((idx[0], idx[1], idx[2]))
}

#[inline]
fn inside(mask: &ArrayView3<bool>, p: Point3) -> bool {
    let (a, b, c) = mask.dim();
    voxel_of(p, [a, b, c]).map_or(false, |v| mask[v])
}

/// 纤维过滤器. 所有掩膜都应已按当前尝试膨胀好.
#[derive(Copy, Clone, Debug)]
pub struct StreamlineFilter<'a> {
    bundle: ArrayView3<'a, bool>,
    endpoints: Option<(ArrayView3<'a, bool>, ArrayView3<'a, bool>)>,
    min_points: usize,
}

impl<'a> StreamlineFilter<'a> {
    /// 只要求纤维全程位于 `bundle` 内.
    #[inline]
    pub fn new(bundle: ArrayView3<'a, bool>, min_points: usize) -> Self {
        Self {
            bundle,
            endpoints: None,
            min_points,
        }
    }

    /// 另外要求一端在 `start` 内, 另一端在 `end` 内 (两种顺序均可).
    #[inline]
    pub fn with_endpoints(self, start: ArrayView3<'a, bool>, end: ArrayView3<'a, bool>) -> Self {
        Self {
            endpoints: Some((start, end)),
            ..self
        }
    }

    /// 是否启用了端点约束?
    #[inline]
    pub fn filters_endpoints(&self) -> bool {
        self.endpoints.is_some()
    }

    /// 纤维 (体素坐标) 是否被接受?
    pub fn accepts(&self, points: &[Point3]) -> bool {
        if points.len() < self.min_points.max(1) {
            return false;
        }
        if !points.iter().all(|p| inside(&self.bundle, *p)) {
            return false;
        }
        match (&self.endpoints, points.first(), points.last()) {
            (None, _, _) => true,
            (Some((start, end)), Some(&first), Some(&last)) => {
                (inside(start, first) && inside(end, last))
                    || (inside(start, last) && inside(end, first))
            }
            _ => false,
        }
    }
}
