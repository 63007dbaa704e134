//! TOM -> 追踪 -> tractometry.

mod common;

use common::{affine, stray, tube, world_in_mask};
use ndarray::Array3;
use tract_berry::morph_3d;
use tract_berry::prelude::*;

fn pipeline() -> Pipeline {
    let tracking = TrackingConfig::default()
        .with_endpoint_filter(true)
        .with_workers(Workers::from_sentinel(2));
    let cfg = PipelineConfig::new(ExperimentType::OrientationField).with_tracking(tracking);
    Pipeline::new(cfg).unwrap()
}

#[test]
fn test_track_only_with_endpoint_filter() {
    let _ = simple_logger::init_with_level(log::Level::Warn);
    let pipe = pipeline();
    assert_eq!(pipe.config().tracking.target_fibers, 2000);

    let a = tube("CST_left", 24);
    let b = stray("CA", 12);
    let toms = [a.tom.clone(), b.tom.clone()];
    let masks = [a.mask.clone(), b.mask.clone()];
    let endings = [a.endings.clone(), b.endings.clone()];
    let aff = affine();

    let results = pipe
        .track(&toms, &masks, Some(&endings[..]), aff, &ProbabilisticTomTracker)
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "CST_left");
    assert_eq!(results[1].0, "CA");

    for ((name, r), t) in results.iter().zip([&a, &b]) {
        let r = r.as_ref().unwrap();
        let prov = r.provenance();
        assert_eq!(r.bundle(), name);
        assert_eq!(prov.target, 2000);
        assert!(r.len() <= 2000);
        assert_eq!(prov.achieved, r.len());
        assert_eq!(r.affine_rows(), aff.to_rows());

        let corridor = morph_3d::dilate(t.mask.mask(), prov.dilation);
        let start = morph_3d::dilate(t.endings.start(), prov.endpoint_dilation);
        let end = morph_3d::dilate(t.endings.end(), prov.endpoint_dilation);
        for s in r.streamlines() {
            assert!(s.points().iter().all(|p| world_in_mask(&aff, *p, corridor.view())));
            let (p, q) = s.endpoints().unwrap();
            let forward = world_in_mask(&aff, p, start.view()) && world_in_mask(&aff, q, end.view());
            let backward = world_in_mask(&aff, q, start.view()) && world_in_mask(&aff, p, end.view());
            assert!(forward || backward);
        }
    }

    let tube_result = results[0].1.as_ref().unwrap();
    assert!(!tube_result.is_empty());

    // 端点远离纤维束, 预算耗尽后返回空结果而非错误.
    let stray_result = results[1].1.as_ref().unwrap();
    assert!(stray_result.is_empty());
    assert!(stray_result.provenance().is_under_target());
    assert_eq!(stray_result.provenance().attempts, 3);
}

#[test]
fn test_missing_mask_and_missing_endings() {
    let pipe = pipeline();
    let a = tube("CST_left", 16);
    let aff = affine();

    let r = pipe.track(
        &[a.tom.clone()],
        &[],
        Some(&[a.endings.clone()][..]),
        aff,
        &ProbabilisticTomTracker,
    );
    assert!(matches!(r, Err(ConfigError::MissingInput(_))));

    // 缺少端点只影响该纤维束.
    let results = pipe
        .track(&[a.tom.clone()], &[a.mask.clone()], None, aff, &ProbabilisticTomTracker)
        .unwrap();
    assert!(matches!(results[0].1, Err(TrackingError::MissingInput { .. })));
}

#[test]
fn test_tractometry_along_tube() {
    let pipe = Pipeline::new(
        PipelineConfig::new(ExperimentType::OrientationField).with_tracking(
            TrackingConfig::default()
                .with_target_fibers(50)
                .with_endpoint_filter(true),
        ),
    )
    .unwrap();
    let a = tube("CST_left", 24);
    let aff = affine();
    let results = pipe
        .track(
            &[a.tom.clone()],
            &[a.mask.clone()],
            Some(&[a.endings.clone()][..]),
            aff,
            &ProbabilisticTomTracker,
        )
        .unwrap();
    let results: Vec<TrackingResult> = results.into_iter().map(|(_, r)| r.unwrap()).collect();
    assert!(!results[0].is_empty());

    // 标量图等于 x 体素坐标.
    let scalar = Array3::from_shape_fn((24, 9, 9), |(x, _, _)| x as f32);
    let table = pipe.run_tractometry(&results, scalar.view(), &aff, Some(&[a.endings.clone()][..]));
    let profiles = table.profiles();
    assert_eq!(profiles.len(), 1);
    let mean = &profiles[0].mean;
    assert_eq!(mean.len(), 100);
    // 所有纤维从起点端 (x 较小) 开始.
    assert!(mean[0] < mean[99]);
    assert!(mean.windows(2).all(|w| w[0] <= w[1] + 1e-3));

    let mut buf = vec![];
    table.write_tsv(&mut buf, Statistic::Mean).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("bundle\tpos_0\t"));
    assert!(text.lines().nth(1).unwrap().starts_with("CST_left\t"));
}
