//! 不可变配置.
//!
//! 配置在启动时构造一次 (`Default` + `with_*`), 之后只以 `&` 传递给各组件.

use crate::consts::{DEFAULT_BATCH_SIZE, DEFAULT_TARGET_FIBERS, MODEL_INPUT_SIZE, MODEL_SPACING_MM};
use crate::error::ConfigError;
use crate::experiment::{ClassSet, ExperimentType};
use crate::fusion::FusionRule;
use crate::post_proc::PostProcessConfig;
use crate::tractometry::Tractometry;
use std::num::NonZeroUsize;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 工作线程数.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Workers {
    /// 使用全部可用核心.
    #[default]
    All,

    /// 固定线程数.
    Fixed(NonZeroUsize),
}

impl Workers {
    /// 从整数构造. `-1` (或任意非正数) 表示全部核心.
    pub fn from_sentinel(n: i64) -> Self {
        match usize::try_from(n).ok().and_then(NonZeroUsize::new) {
            Some(n) => Self::Fixed(n),
            None => Self::All,
        }
    }

    /// 实际线程数.
    pub fn count(&self) -> usize {
        match self {
            Self::All => std::thread::available_parallelism()
                .map_or_else(|_| num_cpus::get(), usize::from),
            Self::Fixed(n) => n.get(),
        }
    }
}

/// 膨胀重试预算.
///
/// 第 `i` 次尝试 (从 0 计) 对纤维束掩膜膨胀 `bundle_dilation + i` 次,
/// 对端点掩膜膨胀 `endpoint_dilation + i` 次.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryBudget {
    /// 最多尝试次数 (含第一次). 至少为 1.
    pub max_attempts: usize,

    /// 第一次尝试时纤维束掩膜的膨胀次数.
    pub bundle_dilation: usize,

    /// 第一次尝试时端点掩膜的膨胀次数.
    pub endpoint_dilation: usize,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            bundle_dilation: 1,
            endpoint_dilation: 1,
        }
    }
}

/// 追踪配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackingConfig {
    /// 每束目标纤维条数.
    pub target_fibers: usize,

    /// 是否要求两端点分别落在起点 / 终点掩膜内.
    pub filter_by_endpoints: bool,

    /// 每条目标纤维对应的种子数.
    pub seeds_per_fiber: usize,

    /// 膨胀重试预算.
    pub retry: RetryBudget,

    /// 并行追踪的纤维束数.
    pub workers: Workers,

    /// 步长 (体素).
    pub step_size: f64,

    /// 相邻两步最大夹角 (度).
    pub max_angle_deg: f64,

    /// 随机扰动幅度 (相对于单位方向).
    pub deviation: f64,

    /// 纤维最少点数. 更短的纤维在过滤前就被丢弃.
    pub min_points: usize,

    /// 单向最多步数.
    pub max_steps: usize,

    /// 随机数种子. 第 `i` 个纤维束使用 `rng_seed + i`.
    pub rng_seed: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            target_fibers: DEFAULT_TARGET_FIBERS,
            filter_by_endpoints: false,
            seeds_per_fiber: 5,
            retry: RetryBudget::default(),
            workers: Workers::All,
            step_size: 0.5,
            max_angle_deg: 30.0,
            deviation: 0.15,
            min_points: 10,
            max_steps: 1000,
            rng_seed: 0x5eed,
        }
    }
}

impl TrackingConfig {
    /// 设置目标条数.
    pub fn with_target_fibers(self, target_fibers: usize) -> Self {
        Self {
            target_fibers,
            ..self
        }
    }

    /// 启用 / 关闭端点过滤.
    pub fn with_endpoint_filter(self, on: bool) -> Self {
        Self {
            filter_by_endpoints: on,
            ..self
        }
    }

    /// 设置重试预算.
    pub fn with_retry(self, retry: RetryBudget) -> Self {
        Self { retry, ..self }
    }

    /// 设置工作线程数.
    pub fn with_workers(self, workers: Workers) -> Self {
        Self { workers, ..self }
    }

    /// 设置随机数种子.
    pub fn with_rng_seed(self, rng_seed: u64) -> Self {
        Self { rng_seed, ..self }
    }

    /// 设置每条纤维的种子数.
    pub fn with_seeds_per_fiber(self, seeds_per_fiber: usize) -> Self {
        Self {
            seeds_per_fiber,
            ..self
        }
    }

    /// 第 `attempt` 次尝试 (从 0 计) 时纤维束掩膜的膨胀次数.
    #[inline]
    pub fn bundle_dilation(&self, attempt: usize) -> usize {
        self.retry.bundle_dilation + attempt
    }

    /// 第 `attempt` 次尝试 (从 0 计) 时端点掩膜的膨胀次数.
    #[inline]
    pub fn endpoint_dilation(&self, attempt: usize) -> usize {
        self.retry.endpoint_dilation + attempt
    }

    /// 检查参数.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |name: &'static str, reason: &str| {
            Err(ConfigError::Parameter {
                name,
                reason: reason.to_string(),
            })
        };
        if self.target_fibers == 0 {
            return bad("target_fibers", "必须为正");
        }
        if self.seeds_per_fiber == 0 {
            return bad("seeds_per_fiber", "必须为正");
        }
        if self.retry.max_attempts == 0 {
            return bad("max_attempts", "至少尝试一次");
        }
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return bad("step_size", "必须为正的有限值");
        }
        if !(0.0..=180.0).contains(&self.max_angle_deg) {
            return bad("max_angle_deg", "必须位于 [0, 180]");
        }
        if !(self.deviation >= 0.0) {
            return bad("deviation", "必须非负");
        }
        if self.min_points < 2 {
            return bad("min_points", "至少为 2");
        }
        Ok(())
    }
}

/// 整个流程的配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// 实验类型.
    pub experiment: ExperimentType,

    /// 类别集合.
    pub classes: ClassSet,

    /// 单视角模式.
    pub single_orientation: bool,

    /// 推理批大小.
    pub batch_size: usize,

    /// 主轴两侧的上下文切片数.
    pub context_slices: usize,

    /// 模型工作分辨率 (mm). `None` 表示直接使用输入分辨率.
    pub model_spacing: Option<f64>,

    /// 模型输入边长. `None` 表示不做立方体填充.
    pub model_size: Option<usize>,

    /// 推理前是否翻转到 MNI 方向约定.
    pub flip_to_mni: bool,

    /// 是否先裁剪到非零包围盒.
    pub crop_to_nonzero: bool,

    /// 是否检查 peaks 的轴向翻转.
    pub check_orientation: bool,

    /// 融合规则.
    pub fusion_rule: FusionRule,

    /// 后处理配置.
    pub post: PostProcessConfig,

    /// 追踪配置.
    pub tracking: TrackingConfig,

    /// Tractometry 配置.
    pub tractometry: Tractometry,
}

impl PipelineConfig {
    /// 给定实验类型的默认配置.
    pub fn new(experiment: ExperimentType) -> Self {
        Self {
            experiment,
            classes: experiment.default_class_set(),
            single_orientation: false,
            batch_size: DEFAULT_BATCH_SIZE,
            context_slices: 0,
            model_spacing: Some(MODEL_SPACING_MM),
            model_size: Some(MODEL_INPUT_SIZE),
            flip_to_mni: true,
            crop_to_nonzero: true,
            check_orientation: true,
            fusion_rule: experiment.fusion_rule(),
            post: PostProcessConfig::default(),
            tracking: TrackingConfig::default(),
            tractometry: Tractometry::default(),
        }
    }

    /// 替换类别集合.
    pub fn with_classes(self, classes: ClassSet) -> Self {
        Self { classes, ..self }
    }

    /// 单视角模式.
    pub fn with_single_orientation(self, single_orientation: bool) -> Self {
        Self {
            single_orientation,
            ..self
        }
    }

    /// 设置批大小.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// 设置上下文切片数.
    pub fn with_context_slices(self, context_slices: usize) -> Self {
        Self {
            context_slices,
            ..self
        }
    }

    /// 设置模型工作分辨率.
    pub fn with_model_spacing(self, model_spacing: Option<f64>) -> Self {
        Self {
            model_spacing,
            ..self
        }
    }

    /// 设置模型输入边长.
    pub fn with_model_size(self, model_size: Option<usize>) -> Self {
        Self { model_size, ..self }
    }

    /// 是否翻转到 MNI 方向.
    pub fn with_flip_to_mni(self, flip_to_mni: bool) -> Self {
        Self {
            flip_to_mni,
            ..self
        }
    }

    /// 是否裁剪到非零包围盒.
    pub fn with_crop_to_nonzero(self, crop_to_nonzero: bool) -> Self {
        Self {
            crop_to_nonzero,
            ..self
        }
    }

    /// 是否检查 peaks 轴向翻转.
    pub fn with_check_orientation(self, check_orientation: bool) -> Self {
        Self {
            check_orientation,
            ..self
        }
    }

    /// 设置融合规则.
    pub fn with_fusion_rule(self, fusion_rule: FusionRule) -> Self {
        Self {
            fusion_rule,
            ..self
        }
    }

    /// 替换后处理配置.
    pub fn with_post(self, post: PostProcessConfig) -> Self {
        Self { post, ..self }
    }

    /// 替换追踪配置.
    pub fn with_tracking(self, tracking: TrackingConfig) -> Self {
        Self { tracking, ..self }
    }

    /// 替换 tractometry 配置.
    pub fn with_tractometry(self, tractometry: Tractometry) -> Self {
        Self {
            tractometry,
            ..self
        }
    }

    /// 检查配置的整体一致性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Parameter {
                name: "batch_size",
                reason: "必须为正".to_string(),
            });
        }
        if let Some(s) = self.model_spacing {
            if !(s > 0.0 && s.is_finite()) {
                return Err(ConfigError::Spacing([s; 3]));
            }
        }
        if self.model_size == Some(0) {
            return Err(ConfigError::Parameter {
                name: "model_size",
                reason: "必须为正".to_string(),
            });
        }
        let vector_rule = self.fusion_rule == FusionRule::SignAlignedMean;
        if vector_rule != self.experiment.is_vector() {
            return Err(ConfigError::Parameter {
                name: "fusion_rule",
                reason: format!("{:?} 不适用于 {}", self.fusion_rule, self.experiment),
            });
        }
        if self.tractometry.n_points < 2 {
            return Err(ConfigError::Parameter {
                name: "n_points",
                reason: "至少为 2".to_string(),
            });
        }
        self.post.validate()?;
        self.tracking.validate()
    }
}
