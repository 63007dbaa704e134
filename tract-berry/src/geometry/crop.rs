//! 推理前的裁剪 / 填充, 以及推理后的复原.

use super::resample::resample_linear;
use ndarray::{s, Array4, ArrayView4, Axis};

/// [`crop_to_nonzero`] 的记录, 用于复原.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CropRecord {
    original: [usize; 3],
    start: [usize; 3],
    end: [usize; 3],
}

impl CropRecord {
    /// 裁剪框起点 (含).
    #[inline]
    pub fn start(&self) -> [usize; 3] {
        self.start
    }

    /// 裁剪框终点 (不含).
    #[inline]
    pub fn end(&self) -> [usize; 3] {
        self.end
    }

    /// 原始空间形状.
    #[inline]
    pub fn original_shape(&self) -> [usize; 3] {
        self.original
    }

    /// 将裁剪后空间中的数据放回原始空间, 框外补零.
    ///
    /// `data` 的空间形状必须等于裁剪框形状, 否则程序 panic.
    pub fn uncrop(&self, data: ArrayView4<f32>) -> Array4<f32> {
        let c = data.len_of(Axis(3));
        let [a, b, d] = self.original;
        let mut out = Array4::<f32>::zeros((a, b, d, c));
        out.slice_mut(s![
            self.start[0]..self.end[0],
            self.start[1]..self.end[1],
            self.start[2]..self.end[2],
            ..
        ])
        .assign(&data);
        out
    }
}

/// 裁剪到所有通道非零体素的包围盒. 全零时保留整个体.
pub fn crop_to_nonzero(data: ArrayView4<f32>) -> (Array4<f32>, CropRecord) {
    let (sx, sy, sz, _) = data.dim();
    let original = [sx, sy, sz];
    let mut start = original;
    let mut end = [0usize; 3];
    for ((x, y, z, _), v) in data.indexed_iter() {
        if *v != 0.0 {
            let p = [x, y, z];
            for i in 0..3 {
                start[i] = start[i].min(p[i]);
                end[i] = end[i].max(p[i] + 1);
            }
        }
    }
    if end.iter().any(|e| *e == 0) {
        start = [0; 3];
        end = original;
    }
    let cropped = data
        .slice(s![start[0]..end[0], start[1]..end[1], start[2]..end[2], ..])
        .to_owned();
    (
        cropped,
        CropRecord {
            original,
            start,
            end,
        },
    )
}

/// [`pad_to_cube`] 的记录, 用于复原.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PadRecord {
    original: [usize; 3],
    offset: [usize; 3],
    side: usize,
    target: usize,
}

impl PadRecord {
    /// 填充前的空间形状.
    #[inline]
    pub fn original_shape(&self) -> [usize; 3] {
        self.original
    }

    /// 填充后 (缩放前) 立方体边长.
    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    /// 缩放后的最终边长.
    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    /// 先缩放回填充后的边长, 再去掉填充部分.
    pub fn unpad(&self, data: ArrayView4<f32>) -> Array4<f32> {
        let cube = resample_linear(data, [self.side; 3]);
        let [a, b, c] = self.original;
        let [oa, ob, oc] = self.offset;
        cube.slice(s![oa..oa + a, ob..ob + b, oc..oc + c, ..])
            .to_owned()
    }
}

/// 居中填充成立方体 (边长为最长轴), 再三线性缩放到 `target` 边长.
pub fn pad_to_cube(data: ArrayView4<f32>, target: usize) -> (Array4<f32>, PadRecord) {
    let (sx, sy, sz, c) = data.dim();
    let original = [sx, sy, sz];
    let side = sx.max(sy).max(sz);
    let offset = original.map(|s| (side - s) / 2);
    let mut cube = Array4::<f32>::zeros((side, side, side, c));
    cube.slice_mut(s![
        offset[0]..offset[0] + sx,
        offset[1]..offset[1] + sy,
        offset[2]..offset[2] + sz,
        ..
    ])
    .assign(&data);
    let scaled = if side == target {
        cube
    } else {
        resample_linear(cube.view(), [target; 3])
    };
    (
        scaled,
        PadRecord {
            original,
            offset,
            side,
            target,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_round_trip() {
        let mut a = Array4::<f32>::zeros((6, 5, 4, 2));
        a[(1, 2, 3, 0)] = 1.0;
        a[(3, 2, 1, 1)] = 2.0;
        let (c, rec) = crop_to_nonzero(a.view());
        assert_eq!(c.dim(), (3, 1, 3, 2));
        assert_eq!(rec.start(), [1, 2, 1]);
        assert_eq!(rec.end(), [4, 3, 4]);
        assert_eq!(rec.uncrop(c.view()), a);
    }

    #[test]
    fn test_crop_all_zero_keeps_volume() {
        let a = Array4::<f32>::zeros((2, 3, 4, 1));
        let (c, rec) = crop_to_nonzero(a.view());
        assert_eq!(c.dim(), (2, 3, 4, 1));
        assert_eq!(rec.start(), [0; 3]);
    }

    #[test]
    fn test_pad_round_trip_without_scaling() {
        let a = Array4::from_shape_fn((4, 2, 3, 1), |(x, y, z, _)| (1 + x + y + z) as f32);
        let (p, rec) = pad_to_cube(a.view(), 4);
        assert_eq!(p.dim(), (4, 4, 4, 1));
        assert_eq!(p[(0, 0, 0, 0)], 0.0);
        assert_eq!(rec.unpad(p.view()), a);
    }

    #[test]
    fn test_pad_round_trip_with_scaling() {
        let a = Array4::from_shape_fn((5, 5, 3, 1), |(x, _, _, _)| x as f32);
        let (p, rec) = pad_to_cube(a.view(), 9);
        assert_eq!(p.dim(), (9, 9, 9, 1));
        let back = rec.unpad(p.view());
        assert_eq!(back.dim(), (5, 5, 3, 1));
        for (u, v) in back.iter().zip(a.iter()) {
            assert!((u - v).abs() < 1e-5);
        }
    }
}
