use crate::consts::{PEAK_CHANNELS, VECTOR_COMPONENTS};
use crate::error::{ConfigError, VolumeIoError};
use crate::experiment::{ClassSet, ExperimentType};
use crate::geometry::VolumeGeometry;
use crate::morph_3d;
use ndarray::{s, Array3, Array4, ArrayView3, ArrayView4, Axis};
use std::path::Path;

mod io;

pub use io::{
    geometry_from_header, header_from_geometry, open_mask, open_nifti_3d, open_nifti_4d,
    save_mask, save_nifti_3d, save_nifti_4d,
};

/// 检查数据空间形状是否与几何描述一致.
fn check_shape(geometry: &VolumeGeometry, data: [usize; 3]) -> Result<(), ConfigError> {
    if geometry.shape() == data {
        Ok(())
    } else {
        Err(ConfigError::ShapeMismatch {
            geometry: geometry.shape(),
            data,
        })
    }
}

#[inline]
fn spatial_shape<T>(data: &ArrayView4<T>) -> [usize; 3] {
    let (a, b, c, _) = data.dim();
    [a, b, c]
}

/// 9 通道 peaks 方向场. 按 `(x, y, z, c)` 组织.
#[derive(Debug, Clone)]
pub struct PeakField {
    data: Array4<f32>,
    geometry: VolumeGeometry,
}

impl PeakField {
    /// 构造. 通道数不为 9, 或空间形状与 `geometry` 不符时返回 `Err`.
    pub fn new(data: Array4<f32>, geometry: VolumeGeometry) -> Result<Self, ConfigError> {
        let found = data.len_of(Axis(3));
        if found != PEAK_CHANNELS {
            return Err(ConfigError::PeakChannels {
                expected: PEAK_CHANNELS,
                found,
            });
        }
        check_shape(&geometry, spatial_shape(&data.view()))?;
        Ok(Self { data, geometry })
    }

    /// 打开 NIfTI 格式的 peaks 文件.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VolumeIoError> {
        let (data, geometry) = open_nifti_4d(path)?;
        Ok(Self::new(data, geometry)?)
    }

    /// 底层数据视图.
    #[inline]
    pub fn data(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// 几何描述.
    #[inline]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// 第 `peak` 个主方向 (0, 1, 2) 的 `(x, y, z, 3)` 视图.
    #[inline]
    pub fn peak(&self, peak: usize) -> ArrayView4<'_, f32> {
        let start = peak * VECTOR_COMPONENTS;
        self.data.slice(s![.., .., .., start..start + VECTOR_COMPONENTS])
    }

    /// 拆分为数据和几何.
    #[inline]
    pub fn into_parts(self) -> (Array4<f32>, VolumeGeometry) {
        (self.data, self.geometry)
    }
}

/// 融合后的逐通道体数据. 按 `(x, y, z, c)` 组织.
#[derive(Debug, Clone)]
pub struct FusedVolume {
    data: Array4<f32>,
    experiment: ExperimentType,
    classes: ClassSet,
    geometry: VolumeGeometry,
}

impl FusedVolume {
    /// 构造. 通道数必须与实验类型和类别集合一致, 空间形状必须与 `geometry` 一致.
    pub fn new(
        data: Array4<f32>,
        experiment: ExperimentType,
        classes: ClassSet,
        geometry: VolumeGeometry,
    ) -> Result<Self, ConfigError> {
        classes.check_channels(experiment, data.len_of(Axis(3)))?;
        check_shape(&geometry, spatial_shape(&data.view()))?;
        Ok(Self {
            data,
            experiment,
            classes,
            geometry,
        })
    }

    /// 底层数据视图.
    #[inline]
    pub fn data(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// 实验类型.
    #[inline]
    pub fn experiment(&self) -> ExperimentType {
        self.experiment
    }

    /// 类别集合.
    #[inline]
    pub fn classes(&self) -> &ClassSet {
        &self.classes
    }

    /// 几何描述.
    #[inline]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// 通道数.
    #[inline]
    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// 第 `ch` 个通道的视图. 越界时 panic.
    #[inline]
    pub fn channel(&self, ch: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(3), ch)
    }

    /// 第 `index` 个纤维束占用的全部通道.
    #[inline]
    pub fn bundle(&self, index: usize) -> ArrayView4<'_, f32> {
        let r = self.classes.channel_range(index, self.experiment);
        self.data.slice(s![.., .., .., r])
    }

    /// 拆分.
    #[inline]
    pub fn into_parts(self) -> (Array4<f32>, ExperimentType, ClassSet, VolumeGeometry) {
        (self.data, self.experiment, self.classes, self.geometry)
    }

    /// 以 `.npy` 格式保存数据部分.
    pub fn save_npy<P: AsRef<Path>>(&self, path: P) -> Result<(), VolumeIoError> {
        ndarray_npy::write_npy(path, &self.data)?;
        Ok(())
    }
}

/// 单个纤维束的二值分割.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleMask {
    name: String,
    mask: Array3<bool>,
}

impl BundleMask {
    /// 构造.
    #[inline]
    pub fn new<S: Into<String>>(name: S, mask: Array3<bool>) -> Self {
        Self {
            name: name.into(),
            mask,
        }
    }

    /// 纤维束名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 掩膜视图.
    #[inline]
    pub fn mask(&self) -> ArrayView3<'_, bool> {
        self.mask.view()
    }

    /// 前景体素数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        morph_3d::count(self.mask.view())
    }

    /// 是否没有前景?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.mask.iter().any(|v| *v)
    }

    /// 拆分.
    #[inline]
    pub fn into_parts(self) -> (String, Array3<bool>) {
        (self.name, self.mask)
    }
}

/// 单个纤维束的起点 / 终点掩膜.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleEndpoints {
    name: String,
    start: Array3<bool>,
    end: Array3<bool>,
}

impl BundleEndpoints {
    /// 构造. 两个掩膜形状必须一致.
    pub fn new<S: Into<String>>(
        name: S,
        start: Array3<bool>,
        end: Array3<bool>,
    ) -> Result<Self, ConfigError> {
        if start.dim() != end.dim() {
            let (a, b, c) = start.dim();
            let (x, y, z) = end.dim();
            return Err(ConfigError::ShapeMismatch {
                geometry: [a, b, c],
                data: [x, y, z],
            });
        }
        Ok(Self {
            name: name.into(),
            start,
            end,
        })
    }

    /// 只有一个端点掩膜 (不区分起止) 时, 起点与终点共用它.
    #[inline]
    pub fn symmetric<S: Into<String>>(name: S, both: Array3<bool>) -> Self {
        Self {
            name: name.into(),
            start: both.clone(),
            end: both,
        }
    }

    /// 纤维束名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 起点掩膜.
    #[inline]
    pub fn start(&self) -> ArrayView3<'_, bool> {
        self.start.view()
    }

    /// 终点掩膜.
    #[inline]
    pub fn end(&self) -> ArrayView3<'_, bool> {
        self.end.view()
    }

    /// 起点 ∪ 终点.
    pub fn union(&self) -> Array3<bool> {
        let mut u = self.start.clone();
        u.zip_mut_with(&self.end, |a, b| *a |= *b);
        u
    }
}

/// 单个纤维束的方向图 (TOM). 按 `(x, y, z, 3)` 组织.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleTom {
    name: String,
    field: Array4<f32>,
}

impl BundleTom {
    /// 构造. 最后一维必须为 3.
    pub fn new<S: Into<String>>(name: S, field: Array4<f32>) -> Result<Self, ConfigError> {
        let found = field.len_of(Axis(3));
        if found != VECTOR_COMPONENTS {
            return Err(ConfigError::Channels {
                experiment: ExperimentType::OrientationField.name(),
                expected: VECTOR_COMPONENTS,
                found,
            });
        }
        Ok(Self {
            name: name.into(),
            field,
        })
    }

    /// 纤维束名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 方向场视图.
    #[inline]
    pub fn field(&self) -> ArrayView4<'_, f32> {
        self.field.view()
    }

    /// 拆分.
    #[inline]
    pub fn into_parts(self) -> (String, Array4<f32>) {
        (self.name, self.field)
    }
}

/// 单个纤维束的密度图.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    name: String,
    map: Array3<f32>,
}

impl DensityMap {
    /// 构造.
    #[inline]
    pub fn new<S: Into<String>>(name: S, map: Array3<f32>) -> Self {
        Self {
            name: name.into(),
            map,
        }
    }

    /// 纤维束名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 密度图视图.
    #[inline]
    pub fn map(&self) -> ArrayView3<'_, f32> {
        self.map.view()
    }
}
