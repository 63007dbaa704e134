//! 错误分类.
//!
//! - 配置错误 ([`ConfigError`]): 调用方式本身有误, 立即中止, 不重试.
//! - 推理 / 融合错误 ([`InferenceError`], [`FusionError`]): 模型与类别集合不匹配等,
//!   同样是致命的.
//! - 追踪错误 ([`TrackingError`]): 只影响出错的那一个纤维束.
//! - 体数据读写错误 ([`VolumeIoError`]).
//!
//! 方向歧义与追踪不足目标条数都不是错误, 只通过 `log::warn!` 报告.

use crate::view::AxisView;
use thiserror::Error;

/// 配置错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// peaks 通道数不为 9.
    #[error("peaks 必须有 {expected} 个通道, 实际为 {found}")]
    PeakChannels {
        /// 期望通道数.
        expected: usize,
        /// 实际通道数.
        found: usize,
    },

    /// 几何描述与数据形状不一致.
    #[error("几何形状 {geometry:?} 与数据形状 {data:?} 不一致")]
    ShapeMismatch {
        /// 几何描述中的形状.
        geometry: [usize; 3],
        /// 数据的空间形状.
        data: [usize; 3],
    },

    /// 体素分辨率非正或非有限.
    #[error("体素分辨率必须为正的有限值, 实际为 {0:?}")]
    Spacing([f64; 3]),

    /// 仿射矩阵不可逆.
    #[error("仿射矩阵不可逆")]
    SingularAffine,

    /// 通道数与实验类型 / 类别集合不符.
    #[error("{experiment} 需要 {expected} 个通道, 实际为 {found}")]
    Channels {
        /// 实验类型名.
        experiment: &'static str,
        /// 期望通道数.
        expected: usize,
        /// 实际通道数.
        found: usize,
    },

    /// 未知纤维束名称.
    #[error("未知纤维束 `{0}`")]
    UnknownBundle(String),

    /// 缺少必须的配套输入.
    #[error("缺少配套输入: {0}")]
    MissingInput(String),

    /// 参数取值不合法.
    #[error("参数 `{name}` 不合法: {reason}")]
    Parameter {
        /// 参数名.
        name: &'static str,
        /// 原因.
        reason: String,
    },
}

/// 模型推理时的黑盒错误.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PredictorError(pub String);

/// 多视角推理错误.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// 模型输入 / 输出通道数与配置不一致.
    #[error("模型 {which} 通道数为 {found}, 期望 {expected}")]
    Channels {
        /// `"输入"` 或 `"输出"`.
        which: &'static str,
        /// 期望值.
        expected: usize,
        /// 实际值.
        found: usize,
    },

    /// 模型输出张量形状不符.
    #[error("视角 {view:?} 的模型输出形状为 {found:?}, 期望 {expected:?}")]
    ShapeMismatch {
        /// 出错的视角.
        view: AxisView,
        /// 期望形状 `(n, c, h, w)`.
        expected: [usize; 4],
        /// 实际形状.
        found: Vec<usize>,
    },

    /// 模型自身报告的错误.
    #[error("视角 {view:?} 推理失败: {source}")]
    Predictor {
        /// 出错的视角.
        view: AxisView,
        /// 底层错误.
        #[source]
        source: PredictorError,
    },

    /// 视角工作线程崩溃.
    #[error("视角 {0:?} 工作线程崩溃")]
    WorkerPanicked(AxisView),
}

/// 视角融合错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    /// 只能融合 1 个或 3 个视角.
    #[error("只能融合 1 个或 3 个视角的结果, 实际为 {0}")]
    ViewCount(usize),

    /// 各视角结果形状不一致.
    #[error("各视角结果形状不一致: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
}

/// 外部追踪引擎错误.
#[derive(Debug, Clone, Error)]
#[error("追踪引擎异常退出: {0}")]
pub struct EngineError(pub String);

/// 单个纤维束的追踪错误.
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    /// 外部追踪引擎失败.
    #[error("纤维束 `{bundle}` 追踪失败: {source}")]
    Engine {
        /// 纤维束名称.
        bundle: String,
        /// 底层错误.
        #[source]
        source: EngineError,
    },

    /// 缺少该束所需的输入 (如端点掩膜).
    #[error("纤维束 `{bundle}` 缺少输入: {what}")]
    MissingInput {
        /// 纤维束名称.
        bundle: String,
        /// 缺少的输入.
        what: &'static str,
    },

    /// 各输入体数据形状不一致.
    #[error("纤维束 `{0}` 的 TOM / 掩膜形状不一致")]
    ShapeMismatch(String),
}

/// 体数据读写错误.
#[derive(Debug, Error)]
pub enum VolumeIoError {
    /// NIfTI 读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 数组形状错误.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// `.npy` 写出错误.
    #[error(transparent)]
    Npy(#[from] ndarray_npy::WriteNpyError),

    /// 追踪结果序列化错误.
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    /// 快照图像写出错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 读入数据违反约束.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 维数不符.
    #[error("期望 {expected} 维数据, 实际为 {found} 维")]
    Dimensionality {
        /// 期望维数.
        expected: usize,
        /// 实际维数.
        found: usize,
    },
}

/// crate 顶层错误.
#[derive(Debug, Error)]
pub enum Error {
    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 推理错误.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// 融合错误.
    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// 体数据读写错误.
    #[error(transparent)]
    Io(#[from] VolumeIoError),
}

/// crate 顶层结果类型.
pub type Result<T> = std::result::Result<T, Error>;
