//! 外部追踪引擎的接入约定.

use crate::error::EngineError;
use crate::Point3;
use ndarray::{ArrayView3, ArrayView4};

/// 一次传播请求. 所有坐标都是体素坐标.
#[derive(Copy, Clone, Debug)]
pub struct TrackingRequest<'a> {
    /// 纤维束名称.
    pub bundle: &'a str,

    /// 方向场, `(x, y, z, 3)`.
    pub tom: ArrayView4<'a, f32>,

    /// 播种掩膜.
    pub seed_mask: ArrayView3<'a, bool>,

    /// 已在播种掩膜内生成好的种子点.
    pub seeds: &'a [Point3],

    /// 传播掩膜. 离开该掩膜即停止.
    pub propagation_mask: ArrayView3<'a, bool>,

    /// 期望返回的纤维条数上限.
    pub max_fibers: usize,

    /// 步长 (体素).
    pub step_size: f64,

    /// 相邻两步最大夹角 (度).
    pub max_angle_deg: f64,

    /// 方向随机扰动幅度.
    pub deviation: f64,

    /// 单向最多步数.
    pub max_steps: usize,

    /// 随机数种子.
    pub rng_seed: u64,
}

/// 追踪引擎: 给定方向场与掩膜, 返回一组体素坐标下的点列.
///
/// 不同纤维束可能在不同线程同时调用同一个引擎, 因此要求 `Sync`.
pub trait TrackingEngine: Sync {
    /// 传播.
    fn track(&self, request: &TrackingRequest) -> Result<Vec<Vec<Point3>>, EngineError>;
}

impl<E: TrackingEngine + ?Sized> TrackingEngine for &E {
    #[inline]
    fn track(&self, request: &TrackingRequest) -> Result<Vec<Vec<Point3>>, EngineError> {
        (**self).track(request)
    }
}

/// 用闭包包装的引擎. 适合测试, 或调用外部进程.
pub struct FnEngine<F> {
    f: F,
}

impl<F> FnEngine<F>
where
    F: Fn(&TrackingRequest) -> Result<Vec<Vec<Point3>>, EngineError> + Sync,
{
    /// 构造.
    #[inline]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> TrackingEngine for FnEngine<F>
where
    F: Fn(&TrackingRequest) -> Result<Vec<Vec<Point3>>, EngineError> + Sync,
{
    #[inline]
    fn track(&self, request: &TrackingRequest) -> Result<Vec<Vec<Point3>>, EngineError> {
        (self.f)(request)
    }
}
