//! 端到端流程.
//!
//! 预处理 (翻转到 MNI -> 重采样到模型分辨率 -> 裁剪 -> 填充为立方体) ->
//! 多视角推理 -> 融合 -> 复原预处理 -> 后处理.
//! 复原顺序与预处理严格相反, 因此输出与输入 peaks 处于同一网格与方向
//! (除非选择保留超分辨率).

use crate::config::PipelineConfig;
use crate::error::{ConfigError, Error, TrackingError};
use crate::experiment::ExperimentType;
use crate::fusion::FusionPolicy;
use crate::geometry::{crop_to_nonzero, pad_to_cube, resample_linear, Affine, MniFlip};
use crate::geometry::{CropRecord, PadRecord, VolumeGeometry};
use crate::inference::MultiAxisInferenceEngine;
use crate::orientation::{OrientationCheck, OrientationChecker};
use crate::post_proc::PostProcessor;
use crate::predictor::Predictor;
use crate::tracking::{BundleTrackingInput, TrackingEngine, TrackingOrchestrator, TrackingResult};
use crate::tractometry::TractometryTable;
use crate::volume::{BundleEndpoints, BundleMask, BundleTom, DensityMap, FusedVolume, PeakField};
use ndarray::{Array4, ArrayView3};

/// 按实验类型区分的后处理结果.
#[derive(Clone, Debug)]
pub enum SegmentationOutput {
    /// 纤维束分割掩膜.
    Bundles(Vec<BundleMask>),

    /// 端点掩膜.
    Endings(Vec<BundleEndpoints>),

    /// 方向图.
    Orientations(Vec<BundleTom>),

    /// 密度图.
    Densities(Vec<DensityMap>),
}

impl SegmentationOutput {
    /// 纤维束个数.
    pub fn len(&self) -> usize {
        match self {
            Self::Bundles(v) => v.len(),
            Self::Endings(v) => v.len(),
            Self::Orientations(v) => v.len(),
            Self::Densities(v) => v.len(),
        }
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 对应的实验类型.
    pub fn experiment(&self) -> ExperimentType {
        match self {
            Self::Bundles(_) => ExperimentType::TractSegmentation,
            Self::Endings(_) => ExperimentType::EndingsSegmentation,
            Self::Orientations(_) => ExperimentType::OrientationField,
            Self::Densities(_) => ExperimentType::DensityRegression,
        }
    }
}

/// 预处理记录.
struct Prepared {
    data: Array4<f32>,
    flip: MniFlip,
    /// 翻转后、重采样前的几何.
    native: VolumeGeometry,
    /// 翻转并重采样后 (裁剪前) 的几何.
    work: VolumeGeometry,
    crop: Option<CropRecord>,
    pad: Option<PadRecord>,
}

/// 端到端流程. 只持有不可变配置.
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// 构造并检查配置.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 检查 peaks 是否存在轴向翻转. 只告警.
    pub fn check_orientation(&self, peaks: &PeakField) -> OrientationCheck {
        OrientationChecker::default().check(peaks)
    }

    fn prepare(&self, peaks: &PeakField) -> Result<Prepared, ConfigError> {
        let cfg = &self.config;
        let flip = if cfg.flip_to_mni {
            MniFlip::from_affine(peaks.geometry().affine())
        } else {
            MniFlip::identity()
        };
        if !flip.is_identity() {
            log::debug!("翻转到 MNI 方向: {:?}", flip.flipped());
        }
        let native = flip.apply_geometry(peaks.geometry());
        let mut data = flip.apply(peaks.data().to_owned(), true);

        let work = match cfg.model_spacing {
            Some(s) if !native.has_spacing([s; 3]) => {
                let work = native.resampled([s; 3])?;
                log::debug!(
                    "重采样: {:?} @ {:?} -> {:?}",
                    native.shape(),
                    native.spacing(),
                    work.shape()
                );
                data = resample_linear(data.view(), work.shape());
                work
            }
            _ => native,
        };

        let crop = if cfg.crop_to_nonzero {
            let (cropped, record) = crop_to_nonzero(data.view());
            data = cropped;
            Some(record)
        } else {
            None
        };
        let pad = cfg.model_size.map(|size| {
            let (cube, record) = pad_to_cube(data.view(), size);
            data = cube;
            record
        });
        Ok(Prepared {
            data,
            flip,
            native,
            work,
            crop,
            pad,
        })
    }

    /// 推理并融合, 结果位于输入 peaks 的网格与方向 (或保留超分辨率).
    pub fn fuse<P: Predictor + ?Sized>(
        &self,
        peaks: &PeakField,
        predictor: &P,
    ) -> Result<FusedVolume, Error> {
        let cfg = &self.config;
        if cfg.check_orientation {
            self.check_orientation(peaks);
        }
        let prepared = self.prepare(peaks)?;
        let (a, b, c, _) = prepared.data.dim();
        let model_geometry = VolumeGeometry::from_spacing([a, b, c], prepared.work.spacing())?;
        let model_peaks = PeakField::new(prepared.data, model_geometry)?;

        let engine = MultiAxisInferenceEngine::new(predictor, cfg.experiment, cfg.classes.clone())
            .single_orientation(cfg.single_orientation)
            .with_batch_size(cfg.batch_size)
            .with_context_slices(cfg.context_slices);
        let fused = engine.infer(&model_peaks, &FusionPolicy::new(cfg.fusion_rule))?;

        let (mut data, experiment, classes, _) = fused.into_parts();
        if let Some(pad) = prepared.pad {
            data = pad.unpad(data.view());
        }
        if let Some(crop) = prepared.crop {
            data = crop.uncrop(data.view());
        }
        let fused = FusedVolume::new(data, experiment, classes, prepared.work)?;
        let fused = PostProcessor::new(&cfg.post).restore_resolution(fused, &prepared.native)?;

        let flip = prepared.flip;
        let geometry = flip.apply_geometry(fused.geometry());
        let (data, experiment, classes, _) = fused.into_parts();
        let data = flip.apply(data, experiment.is_vector());
        Ok(FusedVolume::new(data, experiment, classes, geometry)?)
    }

    /// 后处理.
    pub fn postprocess(&self, fused: &FusedVolume) -> Result<SegmentationOutput, ConfigError> {
        let post = PostProcessor::new(&self.config.post);
        Ok(match fused.experiment() {
            ExperimentType::TractSegmentation => SegmentationOutput::Bundles(post.bundle_masks(fused)?),
            ExperimentType::EndingsSegmentation => {
                SegmentationOutput::Endings(post.endpoint_masks(fused)?)
            }
            ExperimentType::OrientationField => {
                SegmentationOutput::Orientations(post.orientation_fields(fused)?)
            }
            ExperimentType::DensityRegression => {
                SegmentationOutput::Densities(post.density_maps(fused)?)
            }
        })
    }

    /// 推理 + 融合 + 后处理.
    pub fn segment<P: Predictor + ?Sized>(
        &self,
        peaks: &PeakField,
        predictor: &P,
    ) -> Result<SegmentationOutput, Error> {
        let fused = self.fuse(peaks, predictor)?;
        Ok(self.postprocess(&fused)?)
    }

    /// 用 (膨胀后的) 纤维束掩膜截断方向图. 按名称配对, 没有掩膜的方向图保持不变.
    pub fn mask_toms(
        &self,
        toms: Vec<BundleTom>,
        masks: &[BundleMask],
    ) -> Result<Vec<BundleTom>, ConfigError> {
        let post = PostProcessor::new(&self.config.post);
        toms.into_iter()
            .map(|t| match masks.iter().find(|m| m.name() == t.name()) {
                Some(m) => post.mask_tom(t, m, None),
                None => Ok(t),
            })
            .collect()
    }

    /// 逐束追踪. 方向图与掩膜 (以及端点) 按纤维束名称配对.
    ///
    /// 缺少某个方向图对应的纤维束掩膜是配置错误; 其余错误只影响对应的纤维束.
    pub fn track<E: TrackingEngine + ?Sized>(
        &self,
        toms: &[BundleTom],
        masks: &[BundleMask],
        endings: Option<&[BundleEndpoints]>,
        affine: Affine,
        engine: &E,
    ) -> Result<Vec<(String, Result<TrackingResult, TrackingError>)>, ConfigError> {
        let mut inputs = Vec::with_capacity(toms.len());
        for tom in toms {
            let mask = masks
                .iter()
                .find(|m| m.name() == tom.name())
                .ok_or_else(|| ConfigError::MissingInput(format!("`{}` 的纤维束掩膜", tom.name())))?;
            let mut input = BundleTrackingInput::new(tom, mask);
            if let Some(e) = endings.and_then(|es| es.iter().find(|e| e.name() == tom.name())) {
                input = input.with_endpoints(e);
            }
            inputs.push(input);
        }
        let orchestrator = TrackingOrchestrator::new(&self.config.tracking, engine, affine);
        Ok(orchestrator.track_all(&inputs))
    }

    /// 对全部追踪结果计算 tractometry. 没有纤维的纤维束被跳过.
    pub fn run_tractometry(
        &self,
        results: &[TrackingResult],
        scalar: ArrayView3<f32>,
        affine: &Affine,
        endings: Option<&[BundleEndpoints]>,
    ) -> TractometryTable {
        let mut table = TractometryTable::new();
        for r in results {
            let start = endings
                .and_then(|es| es.iter().find(|e| e.name() == r.bundle()))
                .map(|e| e.start());
            if let Some(p) = self.config.tractometry.profile(r, scalar, affine, start) {
                table.push(p);
            }
        }
        table
    }
}
