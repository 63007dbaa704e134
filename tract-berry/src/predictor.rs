//! 黑盒推理模型的接入约定.
//!
//! 模型的输入是一批 2D 切片, 按 `(n, c_in, h, w)` 组织; 输出按 `(n, c_out, h, w)` 组织,
//! 其中 `c_out` 必须等于 [`crate::experiment::ClassSet::channels`].

use crate::error::PredictorError;
use ndarray::{Array4, ArrayView4};

/// 推理模型.
///
/// 三个视角可能在不同线程同时调用同一个模型, 因此要求 `Sync`.
pub trait Predictor: Sync {
    /// 输入通道数.
    fn input_channels(&self) -> usize;

    /// 输出通道数.
    fn output_channels(&self) -> usize;

    /// 对一批切片推理.
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>, PredictorError>;
}

impl<P: Predictor + ?Sized> Predictor for &P {
    #[inline]
    fn input_channels(&self) -> usize {
        (**self).input_channels()
    }

    #[inline]
    fn output_channels(&self) -> usize {
        (**self).output_channels()
    }

    #[inline]
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>, PredictorError> {
        (**self).predict(batch)
    }
}

/// 用闭包包装的模型. 适合测试, 或接入外部推理服务.
pub struct FnPredictor<F> {
    input_channels: usize,
    output_channels: usize,
    f: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(ArrayView4<f32>) -> Result<Array4<f32>, PredictorError> + Sync,
{
    /// 构造.
    pub fn new(input_channels: usize, output_channels: usize, f: F) -> Self {
        Self {
            input_channels,
            output_channels,
            f,
        }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(ArrayView4<f32>) -> Result<Array4<f32>, PredictorError> + Sync,
{
    #[inline]
    fn input_channels(&self) -> usize {
        self.input_channels
    }

    #[inline]
    fn output_channels(&self) -> usize {
        self.output_channels
    }

    #[inline]
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>, PredictorError> {
        (self.f)(batch)
    }
}
