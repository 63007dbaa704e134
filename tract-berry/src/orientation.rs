//! 输入 peaks 的轴向翻转检测.
//!
//! 若 peaks 某个分量的符号约定与图像轴不一致 (常见于不同软件之间的转换),
//! 沿主方向前进一步后, 到达的体素与当前体素的方向往往不再连续.
//! 对 "不翻转 / 翻转 x / 翻转 y / 翻转 z" 四种假设分别计算连续性评分,
//! 若某个翻转假设明显优于不翻转, 就给出告警. 该检测从不中断流程.

use crate::volume::PeakField;
use ndarray::ArrayView4;
use ordered_float::OrderedFloat;
use std::fmt;

/// 翻转假设.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FlipHypothesis {
    /// 不翻转.
    None,

    /// 翻转 x 分量.
    X,

    /// 翻转 y 分量.
    Y,

    /// 翻转 z 分量.
    Z,
}

impl FlipHypothesis {
    /// 全部假设, 顺序固定.
    pub const ALL: [FlipHypothesis; 4] = [Self::None, Self::X, Self::Y, Self::Z];

    /// 被翻转的分量.
    #[inline]
    pub const fn axis(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::X => Some(0),
            Self::Y => Some(1),
            Self::Z => Some(2),
        }
    }

    #[inline]
    fn signs(&self) -> [f64; 3] {
        let mut s = [1.0; 3];
        if let Some(a) = self.axis() {
            s[a] = -1.0;
        }
        s
    }
}

impl fmt::Display for FlipHypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        };
        f.write_str(s)
    }
}

/// 检测结果.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientationCheck {
    /// 各假设的连续性评分, 顺序同 [`FlipHypothesis::ALL`]. 取值于 `[0, 1]`.
    pub scores: [f64; 4],

    /// 建议的翻转. `None` 表示输入看起来没有问题.
    pub suggestion: Option<FlipHypothesis>,
}

impl OrientationCheck {
    /// 假设 `h` 的评分.
    #[inline]
    pub fn score(&self, h: FlipHypothesis) -> f64 {
        self.scores[h as usize]
    }
}

/// 翻转检测器.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OrientationChecker {
    /// 只统计第一主方向长度不小于该值的体素.
    pub min_peak_length: f32,

    /// 最优翻转假设的评分需要超过 "不翻转" 评分的相对幅度.
    pub margin: f64,
}

impl Default for OrientationChecker {
    fn default() -> Self {
        Self {
            min_peak_length: 0.3,
            margin: 0.1,
        }
    }
}

impl OrientationChecker {
    /// 检测 `peaks`. 发现可能的翻转时输出 `warn` 日志.
    pub fn check(&self, peaks: &PeakField) -> OrientationCheck {
        let first = peaks.peak(0);
        let scores = FlipHypothesis::ALL.map(|h| self.continuity(first, h));
        log::debug!("方向连续性评分 (none/x/y/z): {scores:?}");

        let none = scores[0];
        let (best, best_score) = FlipHypothesis::ALL[1..]
            .iter()
            .zip(scores[1..].iter())
            .max_by_key(|(_, s)| OrderedFloat(**s))
            .map(|(h, s)| (*h, *s))
            .unwrap_or((FlipHypothesis::None, none));

        let suggestion = (best_score > 0.0 && best_score > none * (1.0 + self.margin)).then_some(best);
        if let Some(h) = suggestion {
            log::warn!(
                "peaks 的 {h} 分量可能被翻转 (连续性评分 {best_score:.3} vs 不翻转 {none:.3}); \
                 请确认输入方向, 并考虑将 peaks 的 {h} 分量取反后重新运行",
            );
        }
        OrientationCheck { scores, suggestion }
    }

    /// 假设 `h` 下的连续性评分.
    ///
    /// 对每个强方向体素 `p`, 沿 (翻转后的) 单位方向前进一步到 `q`,
    /// 累加 `|v̂(p)·v̂(q)|`. `q` 越界或方向过弱时计 0.
    fn continuity(&self, field: ArrayView4<f32>, h: FlipHypothesis) -> f64 {
        let (sx, sy, sz, _) = field.dim();
        let signs = h.signs();
        let min_len = self.min_peak_length as f64;
        let unit = |x: usize, y: usize, z: usize| -> Option<[f64; 3]> {
            let v = [0, 1, 2].map(|k| field[(x, y, z, k)] as f64 * signs[k]);
            let n = v.iter().map(|c| c * c).sum::<f64>().sqrt();
            (n >= min_len && n > 0.0).then(|| v.map(|c| c / n))
        };

        let mut total = 0.0;
        let mut n = 0usize;
        for x in 0..sx {
            for y in 0..sy {
                for z in 0..sz {
                    let Some(v) = unit(x, y, z) else {
                        continue;
                    };
                    n += 1;
                    let q = [x, y, z]
                        .iter()
                        .zip(v.iter())
                        .map(|(p, c)| *p as f64 + c.round())
                        .collect::<Vec<_>>();
                    let inside = q
                        .iter()
                        .zip([sx, sy, sz].iter())
                        .all(|(c, d)| *c >= 0.0 && *c < *d as f64);
                    if !inside {
                        continue;
                    }
                    if let Some(w) = unit(q[0] as usize, q[1] as usize, q[2] as usize) {
                        total += (v[0] * w[0] + v[1] * w[1] + v[2] * w[2]).abs();
                    }
                }
            }
        }
        if n == 0 {
            0.0
        } else {
            total / n as f64
        }
    }
}
