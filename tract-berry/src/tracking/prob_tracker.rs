//! 基于 TOM 的概率追踪.
//!
//! 从种子点出发, 沿 TOM 方向 (三线性插值) 双向前进. 每一步方向先与上一步对齐符号,
//! 再叠加有界的随机扰动. 遇到以下情况之一即停止该方向:
//!
//! 1. 离开传播掩膜;
//! 2. 方向场过弱;
//! 3. 转角超过 `max_angle_deg`;
//! 4. 达到 `max_steps`.

use super::engine::{TrackingEngine, TrackingRequest};
use super::filter::voxel_of;
use crate::error::EngineError;
use crate::geometry::sample_trilinear;
use crate::Point3;
use ndarray::{ArrayView3, ArrayView4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 方向向量长度低于该值视为无方向.
const MIN_DIRECTION: f64 = 1e-6;

/// 内置的概率追踪器. 无内部状态, 全部参数来自 [`TrackingRequest`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ProbabilisticTomTracker;

#[inline]
fn normalized(v: Point3) -> Option<Point3> {
    let n = v.iter().map(|c| c * c).sum::<f64>().sqrt();
    (n >= MIN_DIRECTION && n.is_finite()).then(|| v.map(|c| c / n))
}

#[inline]
fn dot(a: &Point3, b: &Point3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

struct Walker<'a> {
    components: [ArrayView3<'a, f32>; 3],
    mask: ArrayView3<'a, bool>,
    shape: [usize; 3],
    step: f64,
    min_cos: f64,
    deviation: f64,
    max_steps: usize,
}

impl<'a> Walker<'a> {
    fn new(request: &TrackingRequest<'a>) -> Self {
        let tom: ArrayView4<'a, f32> = request.tom;
        let components = [0, 1, 2].map(|k| tom.index_axis_move(Axis(3), k));
        let (a, b, c) = request.propagation_mask.dim();
        Self {
            components,
            mask: request.propagation_mask,
            shape: [a, b, c],
            step: request.step_size,
            min_cos: request.max_angle_deg.to_radians().cos(),
            deviation: request.deviation,
            max_steps: request.max_steps,
        }
    }

    /// `p` 处的单位方向. 与 `prev` 对齐符号.
    fn direction(&self, p: Point3, prev: Option<&Point3>) -> Option<Point3> {
        let mut v = [0f64; 3];
        for (k, comp) in self.components.iter().enumerate() {
            v[k] = sample_trilinear(comp.view(), p)?;
        }
        let v = normalized(v)?;
        match prev {
            Some(d) if dot(&v, d) < 0.0 => Some(v.map(|c| -c)),
            _ => Some(v),
        }
    }

    fn perturb<R: Rng>(&self, v: Point3, rng: &mut R) -> Point3 {
        if self.deviation <= 0.0 {
            return v;
        }
        let jitter = [0; 3].map(|_| rng.gen_range(-1.0..1.0) * self.deviation);
        normalized([v[0] + jitter[0], v[1] + jitter[1], v[2] + jitter[2]]).unwrap_or(v)
    }

    #[inline]
    fn in_mask(&self, p: Point3) -> bool {
        voxel_of(p, self.shape).map_or(false, |v| self.mask[v])
    }

    /// 从 `seed` 沿初始方向 `dir` 单向前进, 返回不含种子的点列.
    fn walk<R: Rng>(&self, seed: Point3, dir: Point3, rng: &mut R) -> Vec<Point3> {
        let mut points = vec![];
        let mut p = seed;
        let mut d = dir;
        for _ in 0..self.max_steps {
            let next = [0, 1, 2].map(|k| p[k] + self.step * d[k]);
            if !self.in_mask(next) {
                break;
            }
            points.push(next);
            p = next;
            let Some(v) = self.direction(p, Some(&d)) else {
                break;
            };
            let v = self.perturb(v, rng);
            if dot(&v, &d) < self.min_cos {
                break;
            }
            d = v;
        }
        points
    }
}

impl TrackingEngine for ProbabilisticTomTracker {
    fn track(&self, request: &TrackingRequest) -> Result<Vec<Vec<Point3>>, EngineError> {
        let (a, b, c, k) = request.tom.dim();
        if k != 3 || request.propagation_mask.dim() != (a, b, c) {
            return Err(EngineError(format!(
                "TOM 形状 {:?} 与传播掩膜形状 {:?} 不匹配",
                request.tom.dim(),
                request.propagation_mask.dim()
            )));
        }
        if !(request.step_size > 0.0) {
            return Err(EngineError(format!("步长 {} 非法", request.step_size)));
        }

        let walker = Walker::new(request);
        let mut rng = StdRng::seed_from_u64(request.rng_seed);
        let mut ans = Vec::with_capacity(request.seeds.len().min(request.max_fibers));
        for &seed in request.seeds {
            if ans.len() >= request.max_fibers {
                break;
            }
            if !walker.in_mask(seed) {
                continue;
            }
            let Some(d0) = walker.direction(seed, None) else {
                continue;
            };
            let d0 = walker.perturb(d0, &mut rng);
            let forward = walker.walk(seed, d0, &mut rng);
            let backward = walker.walk(seed, d0.map(|c| -c), &mut rng);

            let mut line = Vec::with_capacity(forward.len() + backward.len() + 1);
            line.extend(backward.into_iter().rev());
            line.push(seed);
            line.extend(forward);
            ans.push(line);
        }
        log::debug!(
            "纤维束 `{}`: {} 个种子, 生成 {} 条纤维",
            request.bundle,
            request.seeds.len(),
            ans.len()
        );
        Ok(ans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3, Array4};

    fn tube() -> (Array4<f32>, Array3<bool>) {
        let mut tom = Array4::<f32>::zeros((20, 5, 5, 3));
        tom.slice_mut(s![.., .., .., 0]).fill(1.0);
        let mut mask = Array3::<bool>::default((20, 5, 5));
        mask.slice_mut(s![.., 1..4, 1..4]).fill(true);
        (tom, mask)
    }

    fn request<'a>(
        tom: &'a Array4<f32>,
        mask: &'a Array3<bool>,
        seeds: &'a [Point3],
        deviation: f64,
    ) -> TrackingRequest<'a> {
        TrackingRequest {
            bundle: "CA",
            tom: tom.view(),
            seed_mask: mask.view(),
            seeds,
            propagation_mask: mask.view(),
            max_fibers: 100,
            step_size: 0.5,
            max_angle_deg: 45.0,
            deviation,
            max_steps: 1000,
            rng_seed: 1,
        }
    }

    #[test]
    fn test_straight_tube() {
        let (tom, mask) = tube();
        let seeds = [[10.0, 2.0, 2.0]];
        let lines = ProbabilisticTomTracker
            .track(&request(&tom, &mask, &seeds, 0.0))
            .unwrap();
        assert_eq!(lines.len(), 1);
        let l = &lines[0];
        // 体素 0 覆盖 [-0.5, 0.5), 体素 19 覆盖 [18.5, 19.5).
        assert!((l[0][0] + 0.5).abs() < 1e-9);
        assert!((l[l.len() - 1][0] - 19.0).abs() < 1e-9);
        assert!(l.iter().all(|p| p[1] == 2.0 && p[2] == 2.0));
    }

    #[test]
    fn test_random_walk_stays_in_mask() {
        let (tom, mask) = tube();
        let seeds: Vec<Point3> = (0..20).map(|i| [i as f64, 2.0, 2.0]).collect();
        let lines = ProbabilisticTomTracker
            .track(&request(&tom, &mask, &seeds, 0.3))
            .unwrap();
        assert_eq!(lines.len(), 20);
        for l in lines {
            for p in l {
                let v = voxel_of(p, [20, 5, 5]).unwrap();
                assert!(mask[v]);
            }
        }
    }

    #[test]
    fn test_zero_field_and_bad_shape() {
        let tom = Array4::<f32>::zeros((4, 4, 4, 3));
        let mask = Array3::<bool>::from_elem((4, 4, 4), true);
        let seeds = [[1.0; 3]];
        assert!(ProbabilisticTomTracker
            .track(&request(&tom, &mask, &seeds, 0.0))
            .unwrap()
            .is_empty());
        let small = Array3::<bool>::from_elem((3, 4, 4), true);
        let mut r = request(&tom, &mask, &seeds, 0.0);
        r.propagation_mask = small.view();
        assert!(ProbabilisticTomTracker.track(&r).is_err());
    }
}
