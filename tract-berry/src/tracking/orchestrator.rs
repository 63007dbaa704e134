//! 逐束追踪的调度: 单束状态机 + 多束并行.

use super::engine::{TrackingEngine, TrackingRequest};
use super::filter::StreamlineFilter;
use super::retry::{Attempt, RetryState};
use super::seed::random_seeds;
use super::{Provenance, Streamline, TrackingResult};
use crate::config::TrackingConfig;
use crate::error::TrackingError;
use crate::geometry::Affine;
use crate::morph_3d;
use crate::volume::{BundleEndpoints, BundleMask, BundleTom};
use ndarray::{Array3, ArrayView3, ArrayView4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 单个纤维束的追踪输入. 只借用数据.
#[derive(Copy, Clone, Debug)]
pub struct BundleTrackingInput<'a> {
    name: &'a str,
    tom: ArrayView4<'a, f32>,
    mask: ArrayView3<'a, bool>,
    endpoints: Option<(ArrayView3<'a, bool>, ArrayView3<'a, bool>)>,
}

impl<'a> BundleTrackingInput<'a> {
    /// 由方向场与纤维束掩膜构造. 名称取自 `tom`.
    pub fn new(tom: &'a BundleTom, mask: &'a BundleMask) -> Self {
        Self::from_views(tom.name(), tom.field(), mask.mask())
    }

    /// 直接由视图构造.
    pub fn from_views(
        name: &'a str,
        tom: ArrayView4<'a, f32>,
        mask: ArrayView3<'a, bool>,
    ) -> Self {
        Self {
            name,
            tom,
            mask,
            endpoints: None,
        }
    }

    /// 附加端点掩膜.
    pub fn with_endpoints(self, endpoints: &'a BundleEndpoints) -> Self {
        Self {
            endpoints: Some((endpoints.start(), endpoints.end())),
            ..self
        }
    }

    /// 以视图形式附加端点掩膜.
    pub fn with_endpoint_views(self, start: ArrayView3<'a, bool>, end: ArrayView3<'a, bool>) -> Self {
        Self {
            endpoints: Some((start, end)),
            ..self
        }
    }

    /// 纤维束名称.
    #[inline]
    pub fn name(&self) -> &'a str {
        self.name
    }

    fn check_shapes(&self) -> Result<(), TrackingError> {
        let (a, b, c, k) = self.tom.dim();
        let mut ok = k == 3 && self.mask.dim() == (a, b, c);
        if let Some((s, e)) = &self.endpoints {
            ok &= s.dim() == (a, b, c) && e.dim() == (a, b, c);
        }
        if ok {
            Ok(())
        } else {
            Err(TrackingError::ShapeMismatch(self.name.to_string()))
        }
    }
}

/// 追踪调度器. 只借用配置与引擎.
pub struct TrackingOrchestrator<'c, E: ?Sized> {
    config: &'c TrackingConfig,
    engine: &'c E,
    affine: Affine,
}

impl<'c, E: TrackingEngine + ?Sized> TrackingOrchestrator<'c, E> {
    /// 构造. `affine` 把体素坐标转换为世界坐标.
    pub fn new(config: &'c TrackingConfig, engine: &'c E, affine: Affine) -> Self {
        Self {
            config,
            engine,
            affine,
        }
    }

    /// 追踪单个纤维束. `index` 用于派生该束的随机数种子.
    ///
    /// 除引擎失败与输入不完整外, 总是返回 `Ok`; 不足目标条数只记录日志.
    pub fn track_bundle(
        &self,
        index: usize,
        input: &BundleTrackingInput,
    ) -> Result<TrackingResult, TrackingError> {
        input.check_shapes()?;
        let cfg = self.config;
        let name = input.name;
        let endpoints = match (cfg.filter_by_endpoints, input.endpoints) {
            (false, _) => None,
            (true, Some(e)) => Some(e),
            (true, None) => {
                return Err(TrackingError::MissingInput {
                    bundle: name.to_string(),
                    what: "端点掩膜",
                })
            }
        };

        let target = cfg.target_fibers;
        let mut rng = StdRng::seed_from_u64(cfg.rng_seed.wrapping_add(index as u64));
        let mut state = RetryState::new(cfg);
        while let Some(i) = state.next_attempt() {
            let bundle_dilation = cfg.bundle_dilation(i);
            let endpoint_dilation = cfg.endpoint_dilation(i);
            let corridor = morph_3d::dilate(input.mask, bundle_dilation);
            let ends = endpoints.map(|(s, e)| {
                (
                    morph_3d::dilate(s, endpoint_dilation),
                    morph_3d::dilate(e, endpoint_dilation),
                )
            });

            let seed_mask = match &ends {
                None => input.mask.to_owned(),
                Some((s, e)) => {
                    let mut m: Array3<bool> = s | e;
                    m &= &corridor;
                    m
                }
            };
            let seeds = random_seeds(seed_mask.view(), cfg.seeds_per_fiber * target, &mut rng);
            let request = TrackingRequest {
                bundle: name,
                tom: input.tom.reborrow(),
                seed_mask: seed_mask.view(),
                seeds: &seeds,
                propagation_mask: corridor.view(),
                max_fibers: seeds.len(),
                step_size: cfg.step_size,
                max_angle_deg: cfg.max_angle_deg,
                deviation: cfg.deviation,
                max_steps: cfg.max_steps,
                rng_seed: rng.gen(),
            };
            let lines = self
                .engine
                .track(&request)
                .map_err(|source| TrackingError::Engine {
                    bundle: name.to_string(),
                    source,
                })?;

            let mut filter = StreamlineFilter::new(corridor.view(), cfg.min_points);
            if let Some((s, e)) = &ends {
                filter = filter.with_endpoints(s.view(), e.view());
            }
            let total = lines.len();
            let accepted: Vec<_> = lines.into_iter().filter(|l| filter.accepts(l)).collect();
            log::debug!(
                "纤维束 `{name}` 第 {} 次尝试 (膨胀 {bundle_dilation}/{endpoint_dilation}): \
                 {} 个种子, {total} 条纤维, 接受 {}",
                i + 1,
                seeds.len(),
                accepted.len(),
            );
            state.record(Attempt {
                index: i,
                bundle_dilation,
                endpoint_dilation,
                seed_count: seeds.len(),
                accepted,
            });
        }

        let (best, attempts) = state.finish().unwrap_or((
            Attempt {
                index: 0,
                bundle_dilation: cfg.bundle_dilation(0),
                endpoint_dilation: cfg.endpoint_dilation(0),
                seed_count: 0,
                accepted: vec![],
            },
            0,
        ));
        let streamlines: Vec<_> = best
            .accepted
            .into_iter()
            .map(|l| Streamline::new(l.into_iter().map(|p| self.affine.voxel_to_world(p)).collect()))
            .collect();
        let provenance = Provenance {
            dilation: best.bundle_dilation,
            endpoint_dilation: best.endpoint_dilation,
            attempts,
            seed_count: best.seed_count,
            target,
            achieved: streamlines.len(),
        };
        if provenance.is_under_target() {
            log::warn!(
                "纤维束 `{name}` 仅得到 {}/{target} 条纤维 ({attempts} 次尝试)",
                provenance.achieved
            );
        } else {
            log::info!("纤维束 `{name}`: {target} 条纤维 ({attempts} 次尝试)");
        }
        Ok(TrackingResult::new(name, streamlines, &self.affine, provenance))
    }

    /// 追踪全部纤维束. 单束失败不影响其它束; 返回顺序同 `inputs`.
    pub fn track_all(
        &self,
        inputs: &[BundleTrackingInput],
    ) -> Vec<(String, Result<TrackingResult, TrackingError>)> {
        let one = |(i, input): (usize, &BundleTrackingInput)| {
            (input.name.to_string(), self.track_bundle(i, input))
        };
        #[cfg(feature = "rayon")]
        let results = {
            use rayon::prelude::*;
            let workers = self.config.workers.count();
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => {
                    log::debug!("{} 个纤维束, {workers} 个工作线程", inputs.len());
                    pool.install(|| inputs.par_iter().enumerate().map(one).collect())
                }
                Err(e) => {
                    log::warn!("无法创建线程池 ({e}), 改为顺序追踪");
                    inputs.iter().enumerate().map(one).collect()
                }
            }
        };
        #[cfg(not(feature = "rayon"))]
        let results = inputs.iter().enumerate().map(one).collect();
        results
    }
}
