//! Tractometry: 沿纤维束的标量剖面统计.
//!
//! 1. 每条纤维按弧长等距重采样到 `n_points` 个点;
//! 2. 统一纤维方向 (起点都在同一端);
//! 3. 在每个点处三线性插值采样标量图 (世界坐标经仿射逆变换回体素坐标);
//! 4. 逐位置求均值与标准差. 可选按到平均纤维的距离做高斯加权.
//!
//! # 注意
//!
//! 结果按位置 `0..n_points` 排列. 若提供了起点掩膜, 位置 0 总是靠近起点掩膜的一端.

use crate::consts::TRACTOMETRY_POINTS;
use crate::geometry::{sample_trilinear, Affine};
use crate::morph_3d;
use crate::tracking::{distance, TrackingResult};
use crate::Point3;
use either::Either;
use itertools::{izip, Itertools};
use ndarray::ArrayView3;
use num::Float;
use std::io::Write;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 按弧长等距重采样到 `n` 个点. 首尾点保持不变.
///
/// 空点列返回空; 单点或零长度点列返回 `n` 个相同的点.
pub fn resample_streamline(points: &[Point3], n: usize) -> Vec<Point3> {
    let Some(&first) = points.first() else {
        return vec![];
    };
    if n == 0 {
        return vec![];
    }
    let mut cum = Vec::with_capacity(points.len());
    cum.push(0.0);
    for (a, b) in points.iter().tuple_windows() {
        let last = cum[cum.len() - 1];
        cum.push(last + distance(a, b));
    }
    let total = cum[cum.len() - 1];
    if n == 1 || total <= 0.0 {
        return vec![first; n];
    }

    let mut ans = Vec::with_capacity(n);
    let mut seg = 0;
    for i in 0..n {
        let t = total * i as f64 / (n - 1) as f64;
        while seg + 2 < cum.len() && cum[seg + 1] < t {
            seg += 1;
        }
        let (a, b) = (points[seg], points[seg + 1]);
        let len = cum[seg + 1] - cum[seg];
        let f = if len > 0.0 {
            ((t - cum[seg]) / len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        ans.push([0, 1, 2].map(|k| a[k] + (b[k] - a[k]) * f));
    }
    ans
}

/// 沿给定方向遍历点列.
#[inline]
fn oriented(points: &[Point3], reverse: bool) -> impl Iterator<Item = &Point3> + '_ {
    if reverse {
        Either::Left(points.iter().rev())
    } else {
        Either::Right(points.iter())
    }
}

/// 每条纤维是否需要反向.
///
/// 给定 `anchor` 时, 靠近 `anchor` 的一端作为起点; 否则以第一条纤维的起点为参照.
pub fn orientation_flags(streamlines: &[Vec<Point3>], anchor: Option<Point3>) -> Vec<bool> {
    let Some(reference) = anchor.or_else(|| streamlines.first().and_then(|s| s.first().copied()))
    else {
        return vec![false; streamlines.len()];
    };
    streamlines
        .iter()
        .map(|s| match (s.first(), s.last()) {
            (Some(a), Some(b)) => distance(a, &reference) > distance(b, &reference),
            _ => false,
        })
        .collect()
}

/// 加权均值与标准差. 值为空或权重和为零时返回 `None`.
pub fn weighted_mean_std<T: Float>(values: &[T], weights: &[T]) -> Option<(T, T)> {
    debug_assert_eq!(values.len(), weights.len());
    let w_sum = weights.iter().fold(T::zero(), |acc, w| acc + *w);
    if values.is_empty() || w_sum <= T::zero() {
        return None;
    }
    let mean = izip!(values, weights).fold(T::zero(), |acc, (v, w)| acc + *v * *w) / w_sum;
    let var = izip!(values, weights).fold(T::zero(), |acc, (v, w)| {
        acc + *w * (*v - mean) * (*v - mean)
    }) / w_sum;
    Some((mean, var.sqrt()))
}

/// 单个纤维束的剖面.
#[derive(Clone, Debug, PartialEq)]
pub struct BundleProfile {
    /// 纤维束名称.
    pub bundle: String,

    /// 逐位置均值.
    pub mean: Vec<f64>,

    /// 逐位置标准差.
    pub std: Vec<f64>,

    /// 参与统计的纤维条数.
    pub streamlines: usize,
}

/// Tractometry 计算器.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tractometry {
    /// 每条纤维的采样点数.
    pub n_points: usize,

    /// 是否按到平均纤维的距离做高斯加权.
    pub gaussian_weighting: bool,
}

impl Default for Tractometry {
    fn default() -> Self {
        Self {
            n_points: TRACTOMETRY_POINTS,
            gaussian_weighting: false,
        }
    }
}

impl Tractometry {
    /// 计算 `result` 在标量图 `scalar` 上的剖面. `affine` 是 `scalar` 的仿射.
    ///
    /// `start_mask` (与 `scalar` 同一网格) 用于确定起点端. 没有任何纤维时返回 `None`.
    pub fn profile(
        &self,
        result: &TrackingResult,
        scalar: ArrayView3<f32>,
        affine: &Affine,
        start_mask: Option<ArrayView3<bool>>,
    ) -> Option<BundleProfile> {
        let n = self.n_points.max(1);
        let lines: Vec<Vec<Point3>> = result
            .streamlines()
            .iter()
            .map(|s| resample_streamline(s.points(), n))
            .filter(|s| s.len() == n)
            .collect();
        if lines.is_empty() {
            log::warn!("纤维束 `{}` 没有纤维, 跳过 tractometry", result.bundle());
            return None;
        }

        let anchor = start_mask
            .and_then(morph_3d::centroid)
            .map(|c| affine.voxel_to_world(c));
        let flags = orientation_flags(&lines, anchor);
        let lines: Vec<Vec<Point3>> = izip!(&lines, &flags)
            .map(|(l, f)| oriented(l, *f).copied().collect())
            .collect();

        let values: Vec<Vec<Option<f64>>> = lines
            .iter()
            .map(|l| {
                l.iter()
                    .map(|p| sample_trilinear(scalar, affine.world_to_voxel(*p)))
                    .collect()
            })
            .collect();

        let mut mean = Vec::with_capacity(n);
        let mut std = Vec::with_capacity(n);
        for pos in 0..n {
            let weights = self.weights(&lines, pos);
            let (v, w): (Vec<f64>, Vec<f64>) = izip!(&values, weights)
                .filter_map(|(vals, w)| vals[pos].map(|v| (v, w)))
                .unzip();
            let (m, s) = weighted_mean_std(&v, &w).unwrap_or((f64::NAN, f64::NAN));
            mean.push(m);
            std.push(s);
        }
        Some(BundleProfile {
            bundle: result.bundle().to_string(),
            mean,
            std,
            streamlines: lines.len(),
        })
    }

    /// 第 `pos` 个位置上各纤维的权重.
    fn weights(&self, lines: &[Vec<Point3>], pos: usize) -> Vec<f64> {
        if !self.gaussian_weighting {
            return vec![1.0; lines.len()];
        }
        let k = lines.len() as f64;
        let center = [0, 1, 2].map(|i| lines.iter().map(|l| l[pos][i]).sum::<f64>() / k);
        let d: Vec<f64> = lines.iter().map(|l| distance(&l[pos], &center)).collect();
        let sigma = (d.iter().map(|x| x * x).sum::<f64>() / k).sqrt();
        if sigma <= 0.0 {
            return vec![1.0; lines.len()];
        }
        d.iter()
            .map(|x| (-(x * x) / (2.0 * sigma * sigma)).exp())
            .collect()
    }
}

/// 写出哪个统计量.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Statistic {
    /// 均值.
    Mean,

    /// 标准差.
    Std,
}

/// 多个纤维束剖面组成的表.
#[derive(Clone, Debug, Default)]
pub struct TractometryTable {
    profiles: Vec<BundleProfile>,
}

impl TractometryTable {
    /// 空表.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个剖面.
    #[inline]
    pub fn push(&mut self, profile: BundleProfile) {
        self.profiles.push(profile);
    }

    /// 全部剖面.
    #[inline]
    pub fn profiles(&self) -> &[BundleProfile] {
        &self.profiles
    }

    /// 以制表符分隔写出. 第一行为 `bundle\tpos_0\t...`, 之后每个纤维束一行.
    pub fn write_tsv<W: Write>(&self, mut w: W, stat: Statistic) -> std::io::Result<()> {
        let n = self.profiles.iter().map(|p| p.mean.len()).max().unwrap_or(0);
        writeln!(w, "bundle\t{}", (0..n).map(|i| format!("pos_{i}")).join("\t"))?;
        for p in self.profiles.iter() {
            let row = match stat {
                Statistic::Mean => &p.mean,
                Statistic::Std => &p.std,
            };
            writeln!(w, "{}\t{}", p.bundle, row.iter().map(|v| format!("{v:.6}")).join("\t"))?;
        }
        Ok(())
    }

    /// 写入文件.
    pub fn save_tsv<P: AsRef<Path>>(&self, path: P, stat: Statistic) -> std::io::Result<()> {
        let f = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write_tsv(f, stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Provenance, Streamline};
    use ndarray::Array3;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_resample_equidistant() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [4.0, 0.0, 0.0]];
        let r = resample_streamline(&pts, 5);
        let xs: Vec<f64> = r.iter().map(|p| p[0]).collect();
        for (a, b) in xs.iter().zip([0.0, 1.0, 2.0, 3.0, 4.0]) {
            assert!(close(*a, b), "{xs:?}");
        }
        assert_eq!(resample_streamline(&[[1.0; 3]], 3), vec![[1.0; 3]; 3]);
        assert!(resample_streamline(&[], 3).is_empty());
    }

    #[test]
    fn test_orientation_flags() {
        let a = vec![[0.0; 3], [10.0, 0.0, 0.0]];
        let b = vec![[10.0, 0.0, 0.0], [0.0; 3]];
        assert_eq!(orientation_flags(&[a.clone(), b.clone()], None), vec![false, true]);
        assert_eq!(
            orientation_flags(&[a, b], Some([11.0, 0.0, 0.0])),
            vec![true, false]
        );
    }

    #[test]
    fn test_weighted_mean_std() {
        let (m, s) = weighted_mean_std(&[1.0f64, 3.0], &[1.0, 1.0]).unwrap();
        assert!(close(m, 2.0) && close(s, 1.0));
        let (m, _) = weighted_mean_std(&[1.0f32, 3.0], &[3.0, 1.0]).unwrap();
        assert!((m - 1.5).abs() < 1e-6);
        assert!(weighted_mean_std::<f64>(&[], &[]).is_none());
    }

    #[test]
    fn test_profile_on_gradient() {
        // 标量 = x 坐标.
        let scalar = Array3::from_shape_fn((11, 3, 3), |(x, _, _)| x as f32);
        let affine = Affine::from_spacing([1.0; 3]).unwrap();
        let forward = Streamline::new(vec![[0.0, 1.0, 1.0], [10.0, 1.0, 1.0]]);
        let result = TrackingResult::new(
            "CA",
            vec![forward.clone(), forward.reversed()],
            &affine,
            Provenance::default(),
        );
        let mut start = Array3::<bool>::default((11, 3, 3));
        start[(10, 1, 1)] = true;

        let t = Tractometry {
            n_points: 11,
            gaussian_weighting: true,
        };
        let p = t
            .profile(&result, scalar.view(), &affine, Some(start.view()))
            .unwrap();
        assert_eq!(p.streamlines, 2);
        for (i, (m, s)) in p.mean.iter().zip(p.std.iter()).enumerate() {
            assert!(close(*m, 10.0 - i as f64), "{:?}", p.mean);
            assert!(close(*s, 0.0));
        }

        let mut table = TractometryTable::new();
        table.push(p);
        let mut buf = Vec::new();
        table.write_tsv(&mut buf, Statistic::Mean).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("bundle\tpos_0\tpos_1"));
        assert!(lines.next().unwrap().starts_with("CA\t10.000000\t9.000000"));
    }
}
