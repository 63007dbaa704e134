//! 融合结果的后处理: 二值化, 形态学清理, TOM / 密度图整理, 分辨率恢复.
//!
//! 所有形态学操作都逐通道独立进行, 绝不跨纤维束.

use crate::consts::bundles::SPECIFIC_THRESHOLDS;
use crate::consts::{DEFAULT_BLOB_MIN_SIZE, DEFAULT_THRESHOLD, DEFAULT_TOM_MIN_LENGTH};
use crate::error::ConfigError;
use crate::experiment::ExperimentType;
use crate::geometry::{resample_linear, VolumeGeometry};
use crate::morph_3d;
use crate::volume::{BundleEndpoints, BundleMask, BundleTom, DensityMap, FusedVolume};
use ndarray::{Array3, ArrayView3, Axis, Zip};
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 逐束门限模式的默认门限表.
static DEFAULT_SPECIFIC: Lazy<HashMap<String, f32>> = Lazy::new(|| {
    SPECIFIC_THRESHOLDS
        .iter()
        .map(|(b, t)| (b.to_string(), *t))
        .collect()
});

/// 二值化门限表: 全局门限 + 少数纤维束的专用门限.
///
/// 专用门限是经验值, 作为数据整体替换, 而不是写死在逻辑里.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdTable {
    global: f32,
    specific: HashMap<String, f32>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::global_only(DEFAULT_THRESHOLD)
    }
}

impl ThresholdTable {
    /// 所有纤维束使用同一门限.
    #[inline]
    pub fn global_only(global: f32) -> Self {
        Self {
            global,
            specific: HashMap::new(),
        }
    }

    /// 默认的逐束门限表 (全局 0.5, 少数难分割纤维束更低).
    pub fn bundle_specific() -> Self {
        Self {
            global: DEFAULT_THRESHOLD,
            specific: DEFAULT_SPECIFIC.clone(),
        }
    }

    /// 为 `bundle` 设置专用门限.
    pub fn with<S: Into<String>>(mut self, bundle: S, threshold: f32) -> Self {
        self.specific.insert(bundle.into(), threshold);
        self
    }

    /// 全局门限.
    #[inline]
    pub fn global(&self) -> f32 {
        self.global
    }

    /// `bundle` 使用的门限.
    #[inline]
    pub fn get(&self, bundle: &str) -> f32 {
        self.specific.get(bundle).copied().unwrap_or(self.global)
    }

    /// `bundle` 是否有专用门限?
    #[inline]
    pub fn is_listed(&self, bundle: &str) -> bool {
        self.specific.contains_key(bundle)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ok = |t: f32| (0.0..=1.0).contains(&t);
        if ok(self.global) && self.specific.values().all(|t| ok(*t)) {
            Ok(())
        } else {
            Err(ConfigError::Parameter {
                name: "threshold",
                reason: "门限必须位于 [0, 1]".to_string(),
            })
        }
    }
}

/// 模型工作分辨率与输入分辨率不同时, 输出采用哪个分辨率.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResolutionMode {
    /// 重采样回输入的原始分辨率.
    #[default]
    Native,

    /// 保留模型工作分辨率, 只调整仿射.
    KeepSuperResolution,
}

/// 后处理配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PostProcessConfig {
    /// 全局门限.
    pub threshold: f32,

    /// 是否启用逐束门限.
    pub bundle_specific_threshold: bool,

    /// 逐束门限表. 只在 `bundle_specific_threshold` 时生效.
    pub table: ThresholdTable,

    /// 是否去除小连通域并填充空洞.
    pub cleanup: bool,

    /// 小连通域门限 (体素数).
    pub blob_min_size: usize,

    /// TOM 向量长度下限.
    pub tom_min_length: f32,

    /// 若为 `Some(d)`, TOM 被膨胀 `d` 次后的纤维束分割掩膜截断.
    pub tom_mask_dilation: Option<usize>,

    /// 输出分辨率.
    pub resolution: ResolutionMode,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            bundle_specific_threshold: false,
            table: ThresholdTable::bundle_specific(),
            cleanup: true,
            blob_min_size: DEFAULT_BLOB_MIN_SIZE,
            tom_min_length: DEFAULT_TOM_MIN_LENGTH,
            tom_mask_dilation: None,
            resolution: ResolutionMode::Native,
        }
    }
}

impl PostProcessConfig {
    /// 设置全局门限.
    pub fn with_threshold(self, threshold: f32) -> Self {
        Self { threshold, ..self }
    }

    /// 启用 / 关闭逐束门限.
    pub fn with_bundle_specific_threshold(self, on: bool) -> Self {
        Self {
            bundle_specific_threshold: on,
            ..self
        }
    }

    /// 替换逐束门限表.
    pub fn with_table(self, table: ThresholdTable) -> Self {
        Self { table, ..self }
    }

    /// 启用 / 关闭形态学清理.
    pub fn with_cleanup(self, cleanup: bool) -> Self {
        Self { cleanup, ..self }
    }

    /// 设置小连通域门限.
    pub fn with_blob_min_size(self, blob_min_size: usize) -> Self {
        Self {
            blob_min_size,
            ..self
        }
    }

    /// 设置 TOM 掩膜截断.
    pub fn with_tom_mask_dilation(self, dilation: Option<usize>) -> Self {
        Self {
            tom_mask_dilation: dilation,
            ..self
        }
    }

    /// 设置输出分辨率.
    pub fn with_resolution(self, resolution: ResolutionMode) -> Self {
        Self { resolution, ..self }
    }

    /// 检查参数.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Parameter {
                name: "threshold",
                reason: format!("{} 不在 [0, 1] 内", self.threshold),
            });
        }
        if !(self.tom_min_length >= 0.0) {
            return Err(ConfigError::Parameter {
                name: "tom_min_length",
                reason: "必须非负".to_string(),
            });
        }
        self.table.validate()
    }
}

/// 后处理器. 只借用配置.
#[derive(Copy, Clone, Debug)]
pub struct PostProcessor<'c> {
    config: &'c PostProcessConfig,
}

fn expect_experiment(fused: &FusedVolume, expected: ExperimentType) -> Result<(), ConfigError> {
    if fused.experiment() == expected {
        Ok(())
    } else {
        Err(ConfigError::Parameter {
            name: "experiment",
            reason: format!("期望 {expected} 结果, 实际为 {}", fused.experiment()),
        })
    }
}

impl<'c> PostProcessor<'c> {
    /// 构造.
    #[inline]
    pub fn new(config: &'c PostProcessConfig) -> Self {
        Self { config }
    }

    /// `bundle` 实际使用的门限. 逐束门限不会比全局门限更严格.
    pub fn threshold_for(&self, bundle: &str) -> f32 {
        if self.config.bundle_specific_threshold && self.config.table.is_listed(bundle) {
            self.config.table.get(bundle).min(self.config.threshold)
        } else {
            self.config.threshold
        }
    }

    /// 以 `threshold` 二值化 (严格大于).
    pub fn binarize(channel: ArrayView3<f32>, threshold: f32) -> Array3<bool> {
        channel.mapv(|v| v > threshold)
    }

    /// 小连通域去除 + 空洞填充. `fill` 为假时只去除小连通域.
    pub fn cleanup(&self, mask: &mut Array3<bool>, fill: bool) {
        if !self.config.cleanup {
            return;
        }
        morph_3d::remove_small_components(mask, self.config.blob_min_size);
        if fill {
            morph_3d::fill_holes(mask);
        }
    }

    fn bundle_mask(&self, name: &str, channel: ArrayView3<f32>) -> Array3<bool> {
        let mut mask = Self::binarize(channel, self.threshold_for(name));
        self.cleanup(&mut mask, true);
        mask
    }

    /// 纤维束分割 -> 每束一个二值掩膜.
    pub fn bundle_masks(&self, fused: &FusedVolume) -> Result<Vec<BundleMask>, ConfigError> {
        expect_experiment(fused, ExperimentType::TractSegmentation)?;
        let names = fused.classes().names();
        let one = |(i, n): (usize, &String)| {
            BundleMask::new(n.as_str(), self.bundle_mask(n, fused.channel(i)))
        };
        #[cfg(feature = "rayon")]
        let masks = {
            use rayon::prelude::*;
            names.par_iter().enumerate().map(one).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let masks = names.iter().enumerate().map(one).collect();
        Ok(masks)
    }

    /// 端点分割 -> 每束一对起点 / 终点掩膜. 只去除小连通域, 不填充空洞.
    pub fn endpoint_masks(&self, fused: &FusedVolume) -> Result<Vec<BundleEndpoints>, ConfigError> {
        expect_experiment(fused, ExperimentType::EndingsSegmentation)?;
        let mut ans = Vec::with_capacity(fused.classes().len());
        for (i, name) in fused.classes().names().iter().enumerate() {
            let r = fused
                .classes()
                .channel_range(i, ExperimentType::EndingsSegmentation);
            let threshold = self.threshold_for(name);
            let [start, end] = [r.start, r.start + 1].map(|ch| {
                let mut m = Self::binarize(fused.channel(ch), threshold);
                self.cleanup(&mut m, false);
                m
            });
            ans.push(BundleEndpoints::new(name.as_str(), start, end)?);
        }
        Ok(ans)
    }

    /// TOM -> 每束一个方向场. 过短的向量置零.
    pub fn orientation_fields(&self, fused: &FusedVolume) -> Result<Vec<BundleTom>, ConfigError> {
        expect_experiment(fused, ExperimentType::OrientationField)?;
        let min_len = self.config.tom_min_length;
        let mut ans = Vec::with_capacity(fused.classes().len());
        for (i, name) in fused.classes().names().iter().enumerate() {
            let mut field = fused.bundle(i).to_owned();
            for mut lane in field.lanes_mut(Axis(3)) {
                let len = lane.iter().map(|v| v * v).sum::<f32>().sqrt();
                if len < min_len {
                    lane.fill(0.0);
                }
            }
            ans.push(BundleTom::new(name.as_str(), field)?);
        }
        Ok(ans)
    }

    /// 用 (膨胀后的) 纤维束分割截断 TOM.
    ///
    /// `dilation` 为 `None` 时使用配置中的值; 两者都为 `None` 时不做任何事.
    pub fn mask_tom(
        &self,
        tom: BundleTom,
        mask: &BundleMask,
        dilation: Option<usize>,
    ) -> Result<BundleTom, ConfigError> {
        let Some(d) = dilation.or(self.config.tom_mask_dilation) else {
            return Ok(tom);
        };
        let (name, mut field) = tom.into_parts();
        let (a, b, c, _) = field.dim();
        if mask.mask().dim() != (a, b, c) {
            let (x, y, z) = mask.mask().dim();
            return Err(ConfigError::ShapeMismatch {
                geometry: [x, y, z],
                data: [a, b, c],
            });
        }
        let m = morph_3d::dilate(mask.mask(), d);
        Zip::from(field.lanes_mut(Axis(3)))
            .and(&m)
            .for_each(|mut lane, &keep| {
                if !keep {
                    lane.fill(0.0);
                }
            });
        BundleTom::new(name, field)
    }

    /// 密度回归 -> 每束一个非负密度图.
    pub fn density_maps(&self, fused: &FusedVolume) -> Result<Vec<DensityMap>, ConfigError> {
        expect_experiment(fused, ExperimentType::DensityRegression)?;
        Ok(fused
            .classes()
            .names()
            .iter()
            .enumerate()
            .map(|(i, n)| DensityMap::new(n.as_str(), fused.channel(i).mapv(|v| v.max(0.0))))
            .collect())
    }

    /// 分辨率恢复.
    ///
    /// - [`ResolutionMode::Native`]: 逐通道三线性重采样到 `native` 的形状, 几何取 `native`;
    /// - [`ResolutionMode::KeepSuperResolution`]: 数据不变, 几何保持为模型工作分辨率下的几何
    ///   (其仿射已按分辨率比例调整).
    pub fn restore_resolution(
        &self,
        fused: FusedVolume,
        native: &VolumeGeometry,
    ) -> Result<FusedVolume, ConfigError> {
        match self.config.resolution {
            ResolutionMode::KeepSuperResolution => Ok(fused),
            ResolutionMode::Native if fused.geometry().shape() == native.shape() => Ok(fused),
            ResolutionMode::Native => {
                let (data, experiment, classes, _) = fused.into_parts();
                let data = resample_linear(data.view(), native.shape());
                FusedVolume::new(data, experiment, classes, *native)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ClassSet;
    use ndarray::Array4;

    fn geom(n: usize) -> VolumeGeometry {
        VolumeGeometry::from_spacing([n; 3], [1.0; 3]).unwrap()
    }

    /// 球形概率分布: 中心 1.0, 向外线性衰减.
    fn blob(n: usize, center: f32) -> Array3<f32> {
        Array3::from_shape_fn((n, n, n), |(x, y, z)| {
            let d = [x, y, z]
                .iter()
                .map(|v| (*v as f32 - center).powi(2))
                .sum::<f32>()
                .sqrt();
            (1.0 - d / 8.0).max(0.0)
        })
    }

    #[test]
    fn test_threshold_table() {
        let t = ThresholdTable::bundle_specific();
        assert_eq!(t.get("CA"), 0.3);
        assert_eq!(t.get("AF_left"), 0.5);
        assert!(t.is_listed("FX_right"));
        let t = ThresholdTable::global_only(0.5).with("MCP", 0.2);
        assert_eq!(t.get("MCP"), 0.2);
        assert!(t.with("X", 1.5).validate().is_err());
    }

    #[test]
    fn test_specific_thresholds_are_more_permissive() {
        let classes = ClassSet::new(["CA", "AF_left", "FX_left"]).unwrap();
        let n = 16;
        let mut data = Array4::<f32>::zeros((n, n, n, 3));
        for ch in 0..3 {
            data.index_axis_mut(Axis(3), ch).assign(&blob(n, 7.5));
        }
        let fused = FusedVolume::new(data, ExperimentType::TractSegmentation, classes, geom(n))
            .unwrap();

        let base = PostProcessConfig::default().with_blob_min_size(5);
        let specific = base.clone().with_bundle_specific_threshold(true);
        let global = PostProcessor::new(&base).bundle_masks(&fused).unwrap();
        let special = PostProcessor::new(&specific).bundle_masks(&fused).unwrap();

        for (g, s) in global.iter().zip(special.iter()) {
            assert_eq!(g.name(), s.name());
            if specific.table.is_listed(g.name()) {
                assert!(s.voxel_count() > g.voxel_count());
                // 逐束门限结果包含全局门限结果.
                assert!(g.mask().iter().zip(s.mask().iter()).all(|(a, b)| !*a || *b));
            } else {
                assert_eq!(g, s);
            }
        }
    }

    #[test]
    fn test_specific_threshold_never_stricter_than_global() {
        let classes = ClassSet::new(["CST_left", "CA"]).unwrap();
        let n = 8;
        let mut data = Array4::<f32>::zeros((n, n, n, 2));
        data.slice_mut(ndarray::s![..4, .., .., ..]).fill(0.35);
        let fused = FusedVolume::new(data, ExperimentType::TractSegmentation, classes, geom(n))
            .unwrap();

        let base = PostProcessConfig::default()
            .with_threshold(0.3)
            .with_blob_min_size(1);
        let specific = base.clone().with_bundle_specific_threshold(true);
        let p = PostProcessor::new(&specific);
        assert_eq!(p.threshold_for("CST_left"), 0.3);
        assert_eq!(p.threshold_for("CA"), 0.3);

        let global = PostProcessor::new(&base).bundle_masks(&fused).unwrap();
        let special = p.bundle_masks(&fused).unwrap();
        for (g, s) in global.iter().zip(special.iter()) {
            assert_eq!(g.voxel_count(), 256);
            assert!(s.voxel_count() >= g.voxel_count());
        }
    }

    #[test]
    fn test_cleanup_removes_noise_per_channel() {
        let classes = ClassSet::new(["CA", "MCP"]).unwrap();
        let n = 12;
        let mut data = Array4::<f32>::zeros((n, n, n, 2));
        data.index_axis_mut(Axis(3), 0).assign(&blob(n, 5.5));
        // 通道 1: 单体素噪声 + 与通道 0 相邻的大块.
        data[(0, 0, 0, 1)] = 0.9;
        data.slice_mut(ndarray::s![2..8, 2..8, 2..8, 1]).fill(0.9);
        data[(4, 4, 4, 1)] = 0.0;
        let fused = FusedVolume::new(data, ExperimentType::TractSegmentation, classes, geom(n))
            .unwrap();
        let cfg = PostProcessConfig::default();
        let masks = PostProcessor::new(&cfg).bundle_masks(&fused).unwrap();
        assert!(!masks[1].mask()[(0, 0, 0)]);
        // 空洞被填充.
        assert!(masks[1].mask()[(4, 4, 4)]);
        assert_eq!(masks[1].voxel_count(), 216);

        let raw = PostProcessor::new(&cfg.clone().with_cleanup(false))
            .bundle_masks(&fused)
            .unwrap();
        assert!(raw[1].mask()[(0, 0, 0)]);
    }

    #[test]
    fn test_endpoint_masks() {
        let classes = ClassSet::new(["CA"]).unwrap();
        let mut data = Array4::<f32>::zeros((10, 10, 10, 2));
        data.slice_mut(ndarray::s![0..4, 0..4, 0..4, 0]).fill(0.8);
        data.slice_mut(ndarray::s![6..10, 6..10, 6..10, 1]).fill(0.8);
        let fused =
            FusedVolume::new(data, ExperimentType::EndingsSegmentation, classes, geom(10)).unwrap();
        let cfg = PostProcessConfig::default();
        let e = PostProcessor::new(&cfg).endpoint_masks(&fused).unwrap();
        assert_eq!(e.len(), 1);
        assert!(e[0].start()[(1, 1, 1)] && !e[0].start()[(8, 8, 8)]);
        assert!(e[0].end()[(8, 8, 8)] && !e[0].end()[(1, 1, 1)]);
        assert!(PostProcessor::new(&cfg).bundle_masks(&fused).is_err());
    }

    #[test]
    fn test_orientation_fields_and_masking() {
        let classes = ClassSet::new(["CA"]).unwrap();
        let mut data = Array4::<f32>::zeros((6, 6, 6, 3));
        data.slice_mut(ndarray::s![.., .., .., 0]).fill(1.0);
        data[(0, 0, 0, 0)] = 0.05;
        let fused =
            FusedVolume::new(data, ExperimentType::OrientationField, classes, geom(6)).unwrap();
        let cfg = PostProcessConfig::default();
        let pp = PostProcessor::new(&cfg);
        let toms = pp.orientation_fields(&fused).unwrap();
        assert_eq!(toms[0].field()[(0, 0, 0, 0)], 0.0);
        assert_eq!(toms[0].field()[(1, 0, 0, 0)], 1.0);

        let mut m = Array3::<bool>::default((6, 6, 6));
        m[(3, 3, 3)] = true;
        let mask = BundleMask::new("CA", m);
        let t = pp.mask_tom(toms[0].clone(), &mask, Some(1)).unwrap();
        assert_eq!(t.field()[(3, 3, 4, 0)], 1.0);
        assert_eq!(t.field()[(3, 4, 4, 0)], 0.0);
        // 不指定膨胀时保持原样.
        assert_eq!(pp.mask_tom(toms[0].clone(), &mask, None).unwrap(), toms[0]);
    }

    #[test]
    fn test_density_and_resolution() {
        let classes = ClassSet::new(["CA"]).unwrap();
        let data = Array4::from_shape_fn((5, 5, 5, 1), |(x, _, _, _)| x as f32 - 2.0);
        let fused = FusedVolume::new(data, ExperimentType::DensityRegression, classes, geom(5))
            .unwrap();
        let cfg = PostProcessConfig::default();
        let pp = PostProcessor::new(&cfg);
        let d = pp.density_maps(&fused).unwrap();
        assert_eq!(d[0].map()[(0, 0, 0)], 0.0);
        assert_eq!(d[0].map()[(4, 0, 0)], 2.0);

        let native = VolumeGeometry::from_spacing([3; 3], [2.0; 3]).unwrap();
        let back = pp.restore_resolution(fused.clone(), &native).unwrap();
        assert_eq!(back.geometry().shape(), [3; 3]);
        assert!((back.data()[(2, 0, 0, 0)] - 2.0).abs() < 1e-6);

        let keep = cfg.with_resolution(ResolutionMode::KeepSuperResolution);
        let same = PostProcessor::new(&keep)
            .restore_resolution(fused, &native)
            .unwrap();
        assert_eq!(same.geometry().shape(), [5; 3]);
    }
}
