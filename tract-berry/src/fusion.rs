//! 多视角结果融合.
//!
//! 只接受 1 个或 3 个已逆变换回规范方向的视角结果. 1 个时原样返回.

use crate::consts::VECTOR_COMPONENTS;
use crate::error::FusionError;
use crate::experiment::ExperimentType;
use ndarray::{Array4, ArrayView1, ArrayViewMut1, Axis, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 逐体素融合规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FusionRule {
    /// 逐通道取均值.
    Mean,

    /// 逐通道取最大值.
    Max,

    /// 方向场: 每 3 个通道视为一个无符号方向, 先对齐符号再取均值.
    SignAlignedMean,
}

/// 融合策略.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FusionPolicy {
    rule: FusionRule,
    zero_eps: f32,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self::new(FusionRule::Mean)
    }
}

impl FusionPolicy {
    /// 以给定规则构造.
    #[inline]
    pub fn new(rule: FusionRule) -> Self {
        Self {
            rule,
            zero_eps: 1e-6,
        }
    }

    /// 实验类型的默认策略.
    #[inline]
    pub fn for_experiment(experiment: ExperimentType) -> Self {
        Self::new(experiment.fusion_rule())
    }

    /// 向量长度低于该值视为零向量. 仅影响 [`FusionRule::SignAlignedMean`].
    #[inline]
    pub fn with_zero_eps(self, zero_eps: f32) -> Self {
        Self { zero_eps, ..self }
    }

    /// 融合规则.
    #[inline]
    pub fn rule(&self) -> FusionRule {
        self.rule
    }

    /// 融合.
    ///
    /// # 注意
    ///
    /// 1. `views` 的第一个元素是参考视角.
    /// 2. [`FusionRule::SignAlignedMean`] 的结果方向统一为
    ///   "绝对值最大的分量非负", 因此任意一个视角整体取反都不改变结果.
    pub fn fuse(&self, views: Vec<Array4<f32>>) -> Result<Array4<f32>, FusionError> {
        let [a, b, c] = match <[Array4<f32>; 3]>::try_from(views) {
            Ok(three) => three,
            Err(mut other) if other.len() == 1 => return Ok(other.remove(0)),
            Err(other) => return Err(FusionError::ViewCount(other.len())),
        };
        for v in [&b, &c] {
            if v.shape() != a.shape() {
                return Err(FusionError::ShapeMismatch(
                    a.shape().to_vec(),
                    v.shape().to_vec(),
                ));
            }
        }

        let mut out = Array4::<f32>::zeros(a.raw_dim());
        match self.rule {
            FusionRule::Mean => {
                let zip = Zip::from(&mut out).and(&a).and(&b).and(&c);
                let op = |o: &mut f32, &x: &f32, &y: &f32, &z: &f32| {
                    // f64 累加保证三个相同输入的均值与输入逐位相等.
                    *o = ((x as f64 + y as f64 + z as f64) / 3.0) as f32;
                };
                cfg_if::cfg_if! {
                    if #[cfg(feature = "rayon")] {
                        zip.par_for_each(op);
                    } else {
                        zip.for_each(op);
                    }
                }
            }
            FusionRule::Max => {
                let zip = Zip::from(&mut out).and(&a).and(&b).and(&c);
                let op = |o: &mut f32, &x: &f32, &y: &f32, &z: &f32| *o = x.max(y).max(z);
                cfg_if::cfg_if! {
                    if #[cfg(feature = "rayon")] {
                        zip.par_for_each(op);
                    } else {
                        zip.for_each(op);
                    }
                }
            }
            FusionRule::SignAlignedMean => {
                debug_assert_eq!(a.len_of(Axis(3)) % VECTOR_COMPONENTS, 0);
                let eps = self.zero_eps;
                let zip = Zip::from(out.lanes_mut(Axis(3)))
                    .and(a.lanes(Axis(3)))
                    .and(b.lanes(Axis(3)))
                    .and(c.lanes(Axis(3)));
                let op = |o: ArrayViewMut1<f32>,
                          x: ArrayView1<f32>,
                          y: ArrayView1<f32>,
                          z: ArrayView1<f32>| {
                    sign_aligned_mean_lane(o, x, y, z, eps)
                };
                cfg_if::cfg_if! {
                    if #[cfg(feature = "rayon")] {
                        zip.par_for_each(op);
                    } else {
                        zip.for_each(op);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[inline]
fn norm(v: &[f64; 3]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[inline]
fn dot(u: &[f64; 3], v: &[f64; 3]) -> f64 {
    u.iter().zip(v.iter()).map(|(a, b)| a * b).sum()
}

/// 无符号方向的规范形式: 绝对值最大的分量 (并列时取靠前者) 非负.
///
/// `v` 与 `-v` 的规范形式逐位相同.
#[inline]
fn canonical(v: [f64; 3]) -> [f64; 3] {
    let mut major = 0;
    for k in 1..3 {
        if v[k].abs() > v[major].abs() {
            major = k;
        }
    }
    if v[major] < 0.0 {
        v.map(|x| -x)
    } else {
        v
    }
}

#[inline]
fn group(v: &ArrayView1<f32>, base: usize) -> [f64; 3] {
    canonical([0, 1, 2].map(|k| v[base + k] as f64))
}

/// 单个体素上所有向量通道组的符号对齐均值.
///
/// 各视角先各自规范化, 再与参考视角 (第一个非零视角) 对齐;
/// 与参考正交的视角保持规范形式.
fn sign_aligned_mean_lane(
    mut out: ArrayViewMut1<f32>,
    x: ArrayView1<f32>,
    y: ArrayView1<f32>,
    z: ArrayView1<f32>,
    eps: f32,
) {
    let eps = eps as f64;
    let groups = out.len() / VECTOR_COMPONENTS;
    for g in 0..groups {
        let base = g * VECTOR_COMPONENTS;
        let vecs = [group(&x, base), group(&y, base), group(&z, base)];

        // 全部视角都近似为零向量: 保持为零.
        let Some(reference) = vecs.iter().position(|v| norm(v) >= eps) else {
            continue;
        };
        let r = vecs[reference];
        let mut sum = [0f64; 3];
        for v in vecs.iter() {
            let s = if dot(&r, v) < 0.0 { -1.0 } else { 1.0 };
            for k in 0..3 {
                sum[k] += s * v[k];
            }
        }

        let mean = canonical(sum.map(|x| x / 3.0));
        for k in 0..3 {
            out[base + k] = mean[k] as f32;
        }
    }
}
