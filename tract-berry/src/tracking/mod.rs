//! 逐束纤维追踪.
//!
//! 每个纤维束是一个有界状态机: 播种 -> 传播 (外部引擎) -> 过滤 -> 不足目标时膨胀重试.
//! 传播本身通过 [`TrackingEngine`] 委托给外部; crate 自带一个基于 TOM 的
//! [`ProbabilisticTomTracker`].
//!
//! # 注意
//!
//! 追踪条数不足目标从来不是错误. 调用方必须能接受少于目标条数的结果,
//! 实际条数记录在 [`Provenance::achieved`] 中.

mod engine;
mod filter;
mod orchestrator;
mod prob_tracker;
mod retry;
mod seed;

pub use engine::{FnEngine, TrackingEngine, TrackingRequest};
pub use filter::StreamlineFilter;
pub use orchestrator::{BundleTrackingInput, TrackingOrchestrator};
pub use prob_tracker::ProbabilisticTomTracker;
pub use retry::{Attempt, RetryState};
pub use seed::random_seeds;

use crate::geometry::Affine;
use crate::Point3;

#[cfg(feature = "serde")]
use crate::error::VolumeIoError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use std::path::Path;

/// 一条纤维: 世界坐标下的有序点列. 构造后不可变.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Streamline {
    points: Vec<Point3>,
}

impl Streamline {
    /// 构造.
    #[inline]
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// 点列.
    #[inline]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// 点数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 是否没有任何点?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 两个端点. 空纤维返回 `None`.
    #[inline]
    pub fn endpoints(&self) -> Option<(Point3, Point3)> {
        Some((*self.points.first()?, *self.points.last()?))
    }

    /// 折线总长度.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| distance(&w[0], &w[1]))
            .sum()
    }

    /// 反向后的纤维.
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self { points }
    }

    /// 取出点列.
    #[inline]
    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }
}

#[inline]
pub(crate) fn distance(a: &Point3, b: &Point3) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// 一次追踪的来源记录.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Provenance {
    /// 被采用的那次尝试中, 纤维束掩膜的膨胀次数.
    pub dilation: usize,

    /// 被采用的那次尝试中, 端点掩膜的膨胀次数.
    pub endpoint_dilation: usize,

    /// 共进行了几次尝试.
    pub attempts: usize,

    /// 被采用的那次尝试使用的种子数.
    pub seed_count: usize,

    /// 目标条数.
    pub target: usize,

    /// 实际条数.
    pub achieved: usize,
}

impl Provenance {
    /// 是否未达到目标条数?
    #[inline]
    pub fn is_under_target(&self) -> bool {
        self.achieved < self.target
    }
}

/// 单个纤维束的追踪结果: 纤维 (世界坐标) + 仿射 + 来源记录.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackingResult {
    bundle: String,
    streamlines: Vec<Streamline>,
    affine: [[f64; 4]; 4],
    provenance: Provenance,
}

impl TrackingResult {
    /// 构造.
    pub fn new<S: Into<String>>(
        bundle: S,
        streamlines: Vec<Streamline>,
        affine: &Affine,
        provenance: Provenance,
    ) -> Self {
        Self {
            bundle: bundle.into(),
            streamlines,
            affine: affine.to_rows(),
            provenance,
        }
    }

    /// 纤维束名称.
    #[inline]
    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    /// 被接受的纤维.
    #[inline]
    pub fn streamlines(&self) -> &[Streamline] {
        &self.streamlines
    }

    /// 体素 -> 世界坐标的仿射 (行优先).
    #[inline]
    pub fn affine_rows(&self) -> [[f64; 4]; 4] {
        self.affine
    }

    /// 来源记录.
    #[inline]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// 纤维条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.streamlines.len()
    }

    /// 是否一条纤维都没有?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.streamlines.is_empty()
    }

    /// 以 `bincode` 保存 (纤维点列 + 仿射 + 来源记录).
    #[cfg(feature = "serde")]
    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<(), VolumeIoError> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        bincode::serialize_into(file, self)?;
        Ok(())
    }

    /// 读取 [`Self::save_bincode`] 保存的结果.
    #[cfg(feature = "serde")]
    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self, VolumeIoError> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(bincode::deserialize_from(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamline_basics() {
        let s = Streamline::new(vec![[0.0; 3], [3.0, 4.0, 0.0], [3.0, 4.0, 2.0]]);
        assert_eq!(s.len(), 3);
        assert!((s.length() - 7.0).abs() < 1e-12);
        assert_eq!(s.endpoints(), Some(([0.0; 3], [3.0, 4.0, 2.0])));
        assert_eq!(s.reversed().points()[0], [3.0, 4.0, 2.0]);
        assert_eq!(Streamline::new(vec![]).endpoints(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_result_bincode() {
        let affine = Affine::from_spacing([1.25; 3]).unwrap();
        let r = TrackingResult::new(
            "CST_left",
            vec![Streamline::new(vec![[1.0, 2.0, 3.0], [1.5, 2.0, 3.0]])],
            &affine,
            Provenance {
                dilation: 2,
                endpoint_dilation: 1,
                attempts: 2,
                seed_count: 40,
                target: 8,
                achieved: 1,
            },
        );
        let dir = std::env::temp_dir().join("tract_berry_tracking_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("CST_left.bin");
        r.save_bincode(&path).unwrap();
        let back = TrackingResult::load_bincode(&path).unwrap();
        assert_eq!(back, r);
        assert!(back.provenance().is_under_target());
    }
}
