//! 多视角推理.
//!
//! 每个视角: 变换到视角方向 -> 沿主轴切片 (可带上下文切片) -> 成批调用模型 ->
//! 组装 -> 逆变换回规范方向. 多个视角在 `std::thread::scope` 中并发执行,
//! 全部完成后才进入融合.

use crate::consts::{DEFAULT_BATCH_SIZE, PEAK_CHANNELS};
use crate::error::{Error, InferenceError};
use crate::experiment::{ClassSet, ExperimentType};
use crate::fusion::FusionPolicy;
use crate::predictor::Predictor;
use crate::view::AxisView;
use crate::volume::{FusedVolume, PeakField};
use ndarray::{s, Array4, ArrayView4, Axis};
use std::thread;

/// 多视角推理引擎. 只借用模型, 不持有.
pub struct MultiAxisInferenceEngine<'p, P: ?Sized> {
    predictor: &'p P,
    experiment: ExperimentType,
    classes: ClassSet,
    views: Vec<AxisView>,
    batch_size: usize,
    context_slices: usize,
}

impl<'p, P: Predictor + ?Sized> MultiAxisInferenceEngine<'p, P> {
    /// 构造三视角引擎. 默认不带上下文切片.
    pub fn new(predictor: &'p P, experiment: ExperimentType, classes: ClassSet) -> Self {
        Self {
            predictor,
            experiment,
            classes,
            views: AxisView::ALL.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
            context_slices: 0,
        }
    }

    /// 单视角模式: 只运行规范视角.
    pub fn single_orientation(self, single: bool) -> Self {
        let views = if single {
            vec![AxisView::canonical()]
        } else {
            AxisView::ALL.to_vec()
        };
        Self { views, ..self }
    }

    /// 设置批大小. 0 视为 1.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..self
        }
    }

    /// 设置主轴两侧各堆叠多少张相邻切片作为额外输入通道.
    pub fn with_context_slices(self, context_slices: usize) -> Self {
        Self {
            context_slices,
            ..self
        }
    }

    /// 将要运行的视角.
    #[inline]
    pub fn views(&self) -> &[AxisView] {
        &self.views
    }

    /// 模型应有的输入通道数.
    #[inline]
    pub fn input_channels(&self) -> usize {
        PEAK_CHANNELS * (2 * self.context_slices + 1)
    }

    /// 模型应有的输出通道数.
    #[inline]
    pub fn output_channels(&self) -> usize {
        self.classes.channels(self.experiment)
    }

    /// 检查模型声明的通道数.
    pub fn check_predictor(&self) -> Result<(), InferenceError> {
        let checks = [
            ("输入", self.input_channels(), self.predictor.input_channels()),
            ("输出", self.output_channels(), self.predictor.output_channels()),
        ];
        for (which, expected, found) in checks {
            if expected != found {
                return Err(InferenceError::Channels {
                    which,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// 对 `(x, y, z, 9)` 数据运行全部视角, 返回规范方向下的逐视角结果, 顺序同 [`Self::views`].
    pub fn run(&self, data: ArrayView4<f32>) -> Result<Vec<Array4<f32>>, InferenceError> {
        self.check_predictor()?;
        if let [view] = self.views.as_slice() {
            return Ok(vec![self.run_view(data, *view)?]);
        }
        let results: Vec<Result<Array4<f32>, InferenceError>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .views
                .iter()
                .map(|&view| (view, s.spawn(move || self.run_view(data, view))))
                .collect();
            handles
                .into_iter()
                .map(|(view, th)| {
                    th.join()
                        .unwrap_or(Err(InferenceError::WorkerPanicked(view)))
                })
                .collect()
        });
        results.into_iter().collect()
    }

    /// 推理并融合, 得到 [`FusedVolume`].
    pub fn infer(&self, peaks: &PeakField, policy: &FusionPolicy) -> Result<FusedVolume, Error> {
        let outputs = self.run(peaks.data())?;
        let fused = policy.fuse(outputs)?;
        Ok(FusedVolume::new(
            fused,
            self.experiment,
            self.classes.clone(),
            *peaks.geometry(),
        )?)
    }

    /// 运行单个视角.
    pub fn run_view(
        &self,
        data: ArrayView4<f32>,
        view: AxisView,
    ) -> Result<Array4<f32>, InferenceError> {
        let t = view.transform();
        let v = t.forward(data);
        let signs = t.component_signs();
        let (n, h, w, c_in) = v.dim();
        let c_out = self.output_channels();
        let k = self.context_slices as isize;
        let mut out = Array4::<f32>::zeros((n, h, w, c_out));

        log::debug!("视角 {view}: {n} 张切片, 批大小 {}", self.batch_size);
        for start in (0..n).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(n);
            let mut batch = Array4::<f32>::zeros((end - start, self.input_channels(), h, w));
            for (bi, i) in (start..end).enumerate() {
                for (oi, off) in (-k..=k).enumerate() {
                    let j = i as isize + off;
                    if j < 0 || j >= n as isize {
                        continue;
                    }
                    let sli = v.index_axis(Axis(0), j as usize);
                    for ch in 0..c_in {
                        let sign = signs[ch % 3];
                        batch
                            .slice_mut(s![bi, oi * c_in + ch, .., ..])
                            .zip_mut_with(&sli.index_axis(Axis(2), ch), |b, a| *b = a * sign);
                    }
                }
            }

            let pred = self
                .predictor
                .predict(batch.view())
                .map_err(|source| InferenceError::Predictor { view, source })?;
            let expected = [end - start, c_out, h, w];
            if pred.shape() != expected {
                return Err(InferenceError::ShapeMismatch {
                    view,
                    expected,
                    found: pred.shape().to_vec(),
                });
            }
            for bi in 0..end - start {
                out.index_axis_mut(Axis(0), start + bi)
                    .assign(&pred.index_axis(Axis(0), bi).permuted_axes([1, 2, 0]));
            }
        }
        Ok(t.inverse(out, self.experiment.is_vector()))
    }
}
