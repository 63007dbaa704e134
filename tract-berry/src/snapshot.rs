//! 用于目视检查的 PNG 快照.
//!
//! 掩膜的前景映射为白色, 背景为黑色; 方向图按向量模长线性映射到 `[0, 255]`,
//! 模长不小于 1 的体素为白色.

use crate::error::{ConfigError, VolumeIoError};
use crate::volume::{BundleMask, BundleTom};
use image::{GrayImage, Luma};
use ndarray::{ArrayView2, Axis};
use std::path::Path;

const BLACK: u8 = 0;
const WHITE: u8 = 255;

/// 表明一个可以保存为灰度快照的对象.
pub trait Snapshot {
    /// 沿 `axis` 取第 `index` 层的灰度图. 越界时返回 `None`.
    fn slice_image(&self, axis: usize, index: usize) -> Option<GrayImage>;

    /// 沿 `axis` 的层数.
    fn slice_count(&self, axis: usize) -> usize;

    /// 保存沿 `axis` 的中间层.
    fn save_middle<P: AsRef<Path>>(&self, axis: usize, path: P) -> Result<(), VolumeIoError> {
        let n = self.slice_count(axis);
        let img = self
            .slice_image(axis, n / 2)
            .ok_or_else(|| ConfigError::Parameter {
                name: "axis",
                reason: format!("沿轴 {axis} 没有可用的切片"),
            })?;
        img.save(path)?;
        Ok(())
    }
}

/// 二维切片转图像. 行号为高, 列号为宽.
fn to_image<T: Copy, F: Fn(T) -> u8>(slice: ArrayView2<T>, f: F) -> GrayImage {
    let (height, width) = slice.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &pix) in slice.indexed_iter() {
        buf.put_pixel(w as u32, h as u32, Luma([f(pix)]));
    }
    buf
}

impl Snapshot for BundleMask {
    fn slice_image(&self, axis: usize, index: usize) -> Option<GrayImage> {
        if axis >= 3 || index >= self.slice_count(axis) {
            return None;
        }
        let mask = self.mask();
        let slice = mask.index_axis(Axis(axis), index);
        Some(to_image(slice, |v| if v { WHITE } else { BLACK }))
    }

    #[inline]
    fn slice_count(&self, axis: usize) -> usize {
        if axis < 3 {
            self.mask().len_of(Axis(axis))
        } else {
            0
        }
    }
}

impl Snapshot for BundleTom {
    fn slice_image(&self, axis: usize, index: usize) -> Option<GrayImage> {
        if axis >= 3 || index >= self.slice_count(axis) {
            return None;
        }
        let field = self.field();
        let slice = field.index_axis(Axis(axis), index);
        let magnitude = slice.map_axis(Axis(2), |v| v.iter().map(|c| c * c).sum::<f32>().sqrt());
        Some(to_image(magnitude.view(), |m| {
            (m.clamp(0.0, 1.0) * WHITE as f32).round() as u8
        }))
    }

    #[inline]
    fn slice_count(&self, axis: usize) -> usize {
        if axis < 3 {
            self.field().len_of(Axis(axis))
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    #[test]
    fn test_mask_slice() {
        let mut m = Array3::<bool>::default((4, 5, 6));
        m[(2, 1, 3)] = true;
        let mask = BundleMask::new("CA", m);
        assert_eq!(mask.slice_count(2), 6);
        let img = mask.slice_image(0, 2).unwrap();
        assert_eq!(img.dimensions(), (6, 5));
        assert_eq!(img.get_pixel(3, 1).0, [WHITE]);
        assert_eq!(img.get_pixel(0, 0).0, [BLACK]);
        assert!(mask.slice_image(0, 4).is_none());
        assert!(mask.slice_image(3, 0).is_none());
    }

    #[test]
    fn test_tom_magnitude() {
        let mut f = Array4::<f32>::zeros((3, 3, 3, 3));
        f[(1, 0, 0, 0)] = 0.6;
        f[(1, 0, 0, 1)] = 0.8;
        f[(1, 2, 2, 2)] = 0.5;
        let tom = BundleTom::new("CA", f).unwrap();
        let img = tom.slice_image(0, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [WHITE]);
        assert_eq!(img.get_pixel(2, 2).0, [128]);
        assert_eq!(img.get_pixel(1, 1).0, [BLACK]);
    }

    #[test]
    fn test_save_middle() {
        let mut m = Array3::<bool>::default((4, 4, 5));
        m[(1, 3, 2)] = true;
        let mask = BundleMask::new("CA", m);
        let path = std::env::temp_dir().join("tract_berry_snapshot_CA_mask.png");
        mask.save_middle(2, &path).unwrap();
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(3, 1).0, [WHITE]);
        assert!(mask.save_middle(3, &path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
