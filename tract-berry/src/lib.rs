#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 从 peaks 方向场 (每体素至多三个纤维主方向) 出发,
//! 借助任意满足推理约定的黑盒模型, 完成白质纤维束的多视角分割、
//! 视角融合、后处理、逐束纤维追踪与 tractometry 统计.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 模型本身 (权重、训练) 不在本 crate 范围内. 只要实现了
//!   [`predictor::Predictor`] 的对象, 都可以接入推理流程.
//! 2. 外部追踪引擎同理, 通过 [`tracking::TrackingEngine`] 接入.
//!   crate 自带一个基于 TOM 的概率追踪器 [`tracking::ProbabilisticTomTracker`].
//! 3. 配置 ([`config::PipelineConfig`]) 在启动时构造一次, 之后只以不可变引用传递.
//!
//! # 开发计划
//!
//! ### 体素几何: 仿射、重采样、裁剪/填充、MNI 方向翻转 ✅
//!
//! 实现位于 `tract-berry/src/geometry`.
//!
//! ### 三视角推理与融合 ✅
//!
//! 三个轴向视角 (x / y / z 为主轴) 分别切片、成批推理、逆变换回规范方向,
//! 然后按实验类型融合: 概率通道取均值 (或最大值), 方向通道先做符号对齐再取均值.
//!
//! 实现位于 `tract-berry/src/{view, inference, fusion}.rs`.
//!
//! ### 后处理 ✅
//!
//! 1. 全局门限 / 逐束门限表 (外部可调);
//! 2. 逐通道 6-连通小连通域去除 + 空洞填充;
//! 3. TOM 短向量置零, 密度图负值截断;
//! 4. 超分辨率输出或恢复原始分辨率.
//!
//! 实现位于 `tract-berry/src/{post_proc, morph_3d}.rs`.
//!
//! ### 逐束追踪与过滤 ✅
//!
//! 播种 -> 外部传播 -> 端点 / 掩膜过滤 -> 膨胀重试 (有界状态机).
//! 多个纤维束在 `rayon` 线程池中并行, 单束失败不影响其它束.
//!
//! 实现位于 `tract-berry/src/tracking`.
//!
//! ### Tractometry ✅
//!
//! 纤维等弧长重采样, 方向统一, 三线性插值采样标量图, 沿束剖面统计.
//!
//! 实现位于 `tract-berry/src/tractometry.rs`.
//!
//! ### 输入方向歧义检测 ✅
//!
//! 通过纤维连续性评分判断 peaks 是否存在轴向翻转, 仅告警, 不中断流程.
//!
//! 实现位于 `tract-berry/src/orientation.rs`.
//!
//! ### 3D patch 推理 ⌛️
//!
//! 目前仅支持 2D (及 2.5D 上下文) 切片推理.

/// 三维索引, 按 `(x, y, z)` 组织.
pub type Idx3d = (usize, usize, usize);

/// 三维浮点坐标 / 向量. 体素坐标下, 体素中心位于整数坐标处.
pub type Point3 = [f64; 3];

pub mod consts;

pub mod error;

pub mod config;

pub mod experiment;

pub mod geometry;

/// peaks / 融合结果 / 掩膜等体数据结构.
pub mod volume;

pub mod view;

pub mod predictor;

pub mod inference;

pub mod fusion;

pub mod morph_3d;

pub mod post_proc;

pub mod orientation;

pub mod tracking;

pub mod tractometry;

pub mod pipeline;

pub mod dataset;

pub mod snapshot;

pub mod prelude;

pub use error::{Error, Result};
