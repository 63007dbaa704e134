//! 体素几何: 形状、体素分辨率与仿射变换.

use crate::error::ConfigError;
use crate::{Idx3d, Point3};
use nalgebra::{Matrix4, Vector4};

mod crop;
mod reorient;
mod resample;

pub use crop::{crop_to_nonzero, pad_to_cube, CropRecord, PadRecord};
pub use reorient::MniFlip;
pub use resample::{resample_linear, sample_trilinear, zoom_shape};

/// 体素索引 -> 世界坐标的仿射变换. 构造时即保证可逆.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine {
    m: Matrix4<f64>,
    inv: Matrix4<f64>,
}

impl Affine {
    /// 从 4×4 矩阵构造. 不可逆时返回 `Err`.
    pub fn new(m: Matrix4<f64>) -> Result<Self, ConfigError> {
        let inv = m.try_inverse().ok_or(ConfigError::SingularAffine)?;
        Ok(Self { m, inv })
    }

    /// 行优先的 4×4 数组构造.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Result<Self, ConfigError> {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(Matrix4::from_row_slice(&flat))
    }

    /// 以 `spacing` 为对角元的仿射. `spacing` 须为正.
    pub fn from_spacing(spacing: [f64; 3]) -> Result<Self, ConfigError> {
        check_spacing(spacing)?;
        let [a, b, c] = spacing;
        Self::new(Matrix4::from_diagonal(&Vector4::new(a, b, c, 1.0)))
    }

    /// 行优先的 4×4 数组.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut ans = [[0.0; 4]; 4];
        for (r, row) in ans.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.m[(r, c)];
            }
        }
        ans
    }

    /// 底层矩阵.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.m
    }

    /// 逆矩阵.
    #[inline]
    pub fn inverse(&self) -> &Matrix4<f64> {
        &self.inv
    }

    /// 体素坐标 -> 世界坐标.
    #[inline]
    pub fn voxel_to_world(&self, [x, y, z]: Point3) -> Point3 {
        let v = self.m * Vector4::new(x, y, z, 1.0);
        [v.x, v.y, v.z]
    }

    /// 世界坐标 -> 体素坐标.
    #[inline]
    pub fn world_to_voxel(&self, [x, y, z]: Point3) -> Point3 {
        let v = self.inv * Vector4::new(x, y, z, 1.0);
        [v.x, v.y, v.z]
    }

    /// 各体素轴在世界坐标下的长度 (即体素分辨率).
    pub fn column_norms(&self) -> [f64; 3] {
        [0, 1, 2].map(|c| {
            (0..3)
                .map(|r| self.m[(r, c)].powi(2))
                .sum::<f64>()
                .sqrt()
        })
    }

    /// 第 `axis` 个体素轴在世界坐标下主要朝向的符号. 即 `m[axis][axis]` 的符号.
    #[inline]
    pub fn diagonal_sign(&self, axis: usize) -> f64 {
        self.m[(axis, axis)].signum()
    }

    /// 体素网格按 `factor` 缩放后的仿射: 新体素 `i` 对应旧体素 `i * factor`.
    ///
    /// 体素中心保持在整数坐标处, 因此原点不变.
    pub fn scaled(&self, factor: [f64; 3]) -> Result<Self, ConfigError> {
        check_spacing(factor)?;
        let [a, b, c] = factor;
        Self::new(self.m * Matrix4::from_diagonal(&Vector4::new(a, b, c, 1.0)))
    }

    /// 沿第 `axis` 个体素轴翻转 (该轴长度为 `len`) 后的仿射.
    pub fn flipped(&self, axis: usize, len: usize) -> Self {
        debug_assert!(axis < 3);
        let mut f = Matrix4::<f64>::identity();
        f[(axis, axis)] = -1.0;
        f[(axis, 3)] = len.saturating_sub(1) as f64;
        // 翻转矩阵是对合的, 逆即自身.
        Self {
            m: self.m * f,
            inv: f * self.inv,
        }
    }

    /// 体素网格平移 `offset` 后的仿射: 新体素 `i` 对应旧体素 `i + offset`.
    pub fn translated(&self, offset: [f64; 3]) -> Self {
        let mut t = Matrix4::<f64>::identity();
        let mut t_inv = Matrix4::<f64>::identity();
        for (axis, o) in offset.iter().enumerate() {
            t[(axis, 3)] = *o;
            t_inv[(axis, 3)] = -*o;
        }
        Self {
            m: self.m * t,
            inv: t_inv * self.inv,
        }
    }
}

#[inline]
fn check_spacing(spacing: [f64; 3]) -> Result<(), ConfigError> {
    if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
        Ok(())
    } else {
        Err(ConfigError::Spacing(spacing))
    }
}

/// 三维体数据的不可变几何描述.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeGeometry {
    shape: [usize; 3],
    spacing: [f64; 3],
    affine: Affine,
}

impl VolumeGeometry {
    /// 构造. `spacing` 必须为正的有限值.
    pub fn new(shape: [usize; 3], spacing: [f64; 3], affine: Affine) -> Result<Self, ConfigError> {
        check_spacing(spacing)?;
        Ok(Self {
            shape,
            spacing,
            affine,
        })
    }

    /// 以对角仿射构造.
    pub fn from_spacing(shape: [usize; 3], spacing: [f64; 3]) -> Result<Self, ConfigError> {
        Self::new(shape, spacing, Affine::from_spacing(spacing)?)
    }

    /// 形状 `[x, y, z]`.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// 体素分辨率 (mm).
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 仿射变换.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// 体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn contains(&self, (x, y, z): Idx3d) -> bool {
        let [a, b, c] = self.shape;
        x < a && y < b && z < c
    }

    /// 体素分辨率在三个维度上是否各向同性?
    #[inline]
    pub fn is_isotropic(&self) -> bool {
        let [a, b, c] = self.spacing;
        (a - b).abs() < 1e-6 && (a - c).abs() < 1e-6
    }

    /// 分辨率是否 (在容差内) 等于 `target`?
    #[inline]
    pub fn has_spacing(&self, target: [f64; 3]) -> bool {
        self.spacing
            .iter()
            .zip(target.iter())
            .all(|(a, b)| (a - b).abs() < 1e-3)
    }

    /// 重采样到 `target` 分辨率后的几何.
    ///
    /// 新形状由 [`zoom_shape`] 给出, 仿射按实际缩放比例调整.
    pub fn resampled(&self, target: [f64; 3]) -> Result<Self, ConfigError> {
        check_spacing(target)?;
        let shape = zoom_shape(self.shape, self.spacing, target);
        self.with_shape(shape)
    }

    /// 保持视野不变, 改变网格形状后的几何.
    pub fn with_shape(&self, shape: [usize; 3]) -> Result<Self, ConfigError> {
        if shape.iter().any(|s| *s == 0) {
            return Err(ConfigError::Parameter {
                name: "shape",
                reason: format!("形状 {shape:?} 含有 0"),
            });
        }
        let factor: [f64; 3] = [0, 1, 2].map(|i| grid_factor(self.shape[i], shape[i]));
        let spacing = [0, 1, 2].map(|i| self.spacing[i] * factor[i]);
        Self::new(shape, spacing, self.affine.scaled(factor)?)
    }

    /// 替换仿射.
    #[inline]
    pub fn with_affine(&self, affine: Affine) -> Self {
        Self { affine, ..*self }
    }
}

/// 端点对齐的网格缩放比例: 新网格第 `i` 点对应旧网格 `i * factor`.
#[inline]
pub(crate) fn grid_factor(old: usize, new: usize) -> f64 {
    if new <= 1 || old <= 1 {
        old as f64 / new.max(1) as f64
    } else {
        (old - 1) as f64 / (new - 1) as f64
    }
}
