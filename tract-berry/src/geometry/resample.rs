//! 体数据重采样.
//!
//! 新旧网格端点对齐: 新网格第 `i` 个体素对应旧网格 `i * (old - 1) / (new - 1)`.

use super::grid_factor;
use crate::Point3;
use ndarray::{Array4, ArrayView3, ArrayView4, Axis, Zip};

/// 将 `shape` 从分辨率 `from` 重采样到 `to` 后的形状.
pub fn zoom_shape(shape: [usize; 3], from: [f64; 3], to: [f64; 3]) -> [usize; 3] {
    [0, 1, 2].map(|i| {
        if shape[i] <= 1 {
            return shape[i];
        }
        let extent = (shape[i] - 1) as f64 * from[i] / to[i];
        extent.round().max(1.0) as usize + 1
    })
}

/// 对 `(x, y, z, c)` 组织的数据逐通道三线性重采样到空间形状 `shape`.
pub fn resample_linear(data: ArrayView4<f32>, shape: [usize; 3]) -> Array4<f32> {
    let (sx, sy, sz, c) = data.dim();
    if [sx, sy, sz] == shape {
        return data.to_owned();
    }
    let factor = [
        grid_factor(sx, shape[0]),
        grid_factor(sy, shape[1]),
        grid_factor(sz, shape[2]),
    ];
    let mut out = Array4::<f32>::zeros((shape[0], shape[1], shape[2], c));
    Zip::indexed(out.lanes_mut(Axis(3))).for_each(|(x, y, z), mut lane| {
        let p = [
            x as f64 * factor[0],
            y as f64 * factor[1],
            z as f64 * factor[2],
        ];
        for (ch, v) in lane.iter_mut().enumerate() {
            let view = data.index_axis(Axis(3), ch);
            *v = sample_trilinear(view, p).unwrap_or(0.0) as f32;
        }
    });
    out
}

/// 在体素坐标 `p` 处三线性插值. `p` 落在网格外 (超出半个体素) 时返回 `None`.
///
/// 边界处使用最近的合法体素值.
pub fn sample_trilinear(data: ArrayView3<f32>, p: Point3) -> Option<f64> {
    let (sx, sy, sz) = data.dim();
    let dims = [sx, sy, sz];
    if dims.iter().any(|d| *d == 0) {
        return None;
    }
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut t = [0f64; 3];
    for i in 0..3 {
        let max = (dims[i] - 1) as f64;
        if !(-0.5..=max + 0.5).contains(&p[i]) {
            return None;
        }
        let q = p[i].clamp(0.0, max);
        let f = q.floor();
        lo[i] = f as usize;
        hi[i] = (lo[i] + 1).min(dims[i] - 1);
        t[i] = q - f;
    }
    let v = |x: usize, y: usize, z: usize| data[(x, y, z)] as f64;
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let c00 = lerp(v(lo[0], lo[1], lo[2]), v(hi[0], lo[1], lo[2]), t[0]);
    let c10 = lerp(v(lo[0], hi[1], lo[2]), v(hi[0], hi[1], lo[2]), t[0]);
    let c01 = lerp(v(lo[0], lo[1], hi[2]), v(hi[0], lo[1], hi[2]), t[0]);
    let c11 = lerp(v(lo[0], hi[1], hi[2]), v(hi[0], hi[1], hi[2]), t[0]);
    let c0 = lerp(c00, c10, t[1]);
    let c1 = lerp(c01, c11, t[1]);
    Some(lerp(c0, c1, t[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_zoom_shape() {
        assert_eq!(zoom_shape([9, 9, 1], [2.0; 3], [1.0; 3]), [17, 17, 1]);
        assert_eq!(zoom_shape([17, 5, 5], [1.0; 3], [2.0; 3]), [9, 3, 3]);
    }

    #[test]
    fn test_trilinear_exact_on_grid() {
        let a = Array3::from_shape_fn((3, 3, 3), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        assert_eq!(sample_trilinear(a.view(), [1.0, 2.0, 0.0]), Some(21.0));
        // 线性函数的插值是精确的.
        let v = sample_trilinear(a.view(), [0.5, 1.5, 1.25]).unwrap();
        assert!((v - (0.5 + 15.0 + 125.0)).abs() < 1e-9);
        assert_eq!(sample_trilinear(a.view(), [-0.6, 0.0, 0.0]), None);
        assert_eq!(sample_trilinear(a.view(), [2.4, 0.0, 0.0]), Some(2.0));
    }

    #[test]
    fn test_resample_linear_up_then_down() {
        let a = Array4::from_shape_fn((3, 3, 3, 2), |(x, y, z, c)| (x + y + z + c) as f32);
        let up = resample_linear(a.view(), [5, 5, 5]);
        assert_eq!(up.dim(), (5, 5, 5, 2));
        assert!((up[(1, 0, 0, 0)] - 0.5).abs() < 1e-6);
        let down = resample_linear(up.view(), [3, 3, 3]);
        for (p, q) in down.iter().zip(a.iter()) {
            assert!((p - q).abs() < 1e-5);
        }
    }}
