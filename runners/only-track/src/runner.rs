//! 程序运行函数.

use crate::result::TrackReport;
use std::error::Error;
use std::fs;
use std::time::Instant;
use tract_berry::prelude::*;
use tract_berry::volume::open_nifti_3d;
use utils::loader::{self, LoadedBundle};

/// 实际运行.
pub fn run() -> Result<TrackReport, Box<dyn Error>> {
    let layout = loader::layout_from_env_or_home().ok_or("无法确定受试者目录")?;
    if !layout.root().is_dir() {
        return Err(format!("受试者目录 `{}` 不存在", layout.root().display()).into());
    }

    let tom_20 = ClassSet::tom_20();
    let bundles = layout.trackable_bundles(tom_20.names().iter().map(String::as_str));
    if bundles.is_empty() {
        return Err("没有同时具有 TOM 与纤维束分割的纤维束".into());
    }

    let loaded = bundles
        .iter()
        .map(|b| loader::load_bundle(&layout, b))
        .collect::<Result<Vec<LoadedBundle>, _>>()?;
    let geometry = loaded[0].geometry;
    if let Some(l) = loaded.iter().find(|l| l.geometry.shape() != geometry.shape()) {
        return Err(format!("纤维束 `{}` 的网格与其它纤维束不一致", l.tom.name()).into());
    }

    // 只有全部纤维束都有端点掩膜时才按端点过滤.
    let with_endings = loaded.iter().all(|l| l.endings.is_some());
    let tracking = TrackingConfig::default()
        .with_endpoint_filter(with_endings)
        .with_workers(loader::workers_from_env());
    let pipe = Pipeline::new(
        PipelineConfig::new(ExperimentType::OrientationField).with_tracking(tracking),
    )?;

    let toms: Vec<BundleTom> = loaded.iter().map(|l| l.tom.clone()).collect();
    let masks: Vec<BundleMask> = loaded.iter().map(|l| l.mask.clone()).collect();
    let endings: Vec<BundleEndpoints> = loaded.iter().filter_map(|l| l.endings.clone()).collect();
    drop(loaded);

    if loader::snapshots_from_env() {
        fs::create_dir_all(layout.snapshot_dir())?;
        for (t, m) in toms.iter().zip(masks.iter()) {
            m.save_middle(2, layout.snapshot(m.name(), "mask"))?;
            t.save_middle(2, layout.snapshot(t.name(), "tom"))?;
        }
        log::info!("快照已写入 `{}`", layout.snapshot_dir().display());
    }

    println!(
        "Tracking {} bundles with {} workers...",
        toms.len(),
        pipe.config().tracking.workers.count()
    );
    let start = Instant::now();
    let affine = *geometry.affine();
    let results = pipe.track(
        &toms,
        &masks,
        with_endings.then_some(endings.as_slice()),
        affine,
        &ProbabilisticTomTracker,
    )?;
    let elapsed = start.elapsed();

    fs::create_dir_all(layout.tracking_dir())?;
    let mut ok = Vec::with_capacity(results.len());
    let mut report = TrackReport::new(elapsed, utils::cpus());
    for (name, r) in results {
        match r {
            Ok(r) => {
                r.save_bincode(layout.tracking(&name))?;
                report.push(name, Ok(*r.provenance()));
                ok.push(r);
            }
            Err(e) => report.push(name, Err(e.to_string())),
        }
    }

    if let Some(path) = loader::scalar_from_env() {
        let (scalar, g) = open_nifti_3d(path)?;
        if g.shape() != geometry.shape() {
            return Err("标量图与 TOM 网格不一致".into());
        }
        let table = pipe.run_tractometry(
            &ok,
            scalar.view(),
            g.affine(),
            with_endings.then_some(endings.as_slice()),
        );
        for stat in [Statistic::Mean, Statistic::Std] {
            table.save_tsv(layout.tractometry(stat), stat)?;
        }
        report.set_profiled(table.profiles().len());
    }
    Ok(report)
}
