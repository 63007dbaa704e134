//! 对 `tract-berry::dataset` 的更一层封装. 提供受试者目录与逐束数据的加载.

use std::env;
use std::path::PathBuf;
use tract_berry::config::Workers;
use tract_berry::dataset::{Ending, SubjectLayout};
use tract_berry::error::VolumeIoError;
use tract_berry::geometry::VolumeGeometry;
use tract_berry::volume::{open_mask, open_nifti_4d, BundleEndpoints, BundleMask, BundleTom};

/// 获取受试者目录.
///
/// 1. 若环境变量 `$TRACT_SUBJECT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/tractseg/subject`. 无法确定用户主目录时返回 `None`.
pub fn subject_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("TRACT_SUBJECT_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => tract_berry::dataset::home_dataset_dir_with(["tractseg", "subject"]),
    }
}

/// 从 `$TRACT_SUBJECT_DIR` 或者 `$HOME/dataset/tractseg/subject` 构造受试者目录布局.
#[inline]
pub fn layout_from_env_or_home() -> Option<SubjectLayout> {
    subject_dir_from_env_or_home().map(SubjectLayout::new)
}

/// 获取 tractometry 使用的标量图 (例如 FA) 路径, 来自 `$TRACT_SCALAR`.
pub fn scalar_from_env() -> Option<PathBuf> {
    env::var("TRACT_SCALAR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// 是否输出质控快照, 来自 `$TRACT_SNAPSHOTS`. 取值 `1` 或 `true` 时打开.
pub fn snapshots_from_env() -> bool {
    env::var("TRACT_SNAPSHOTS")
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

/// 追踪线程数, 来自 `$TRACT_WORKERS`. 缺省或非正数表示使用全部核心.
pub fn workers_from_env() -> Workers {
    env::var("TRACT_WORKERS")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map_or(Workers::All, Workers::from_sentinel)
}

/// 单个纤维束的追踪输入.
pub struct LoadedBundle {
    /// 方向图.
    pub tom: BundleTom,

    /// 纤维束分割掩膜.
    pub mask: BundleMask,

    /// 端点掩膜. 任一端缺失时为 `None`.
    pub endings: Option<BundleEndpoints>,

    /// 方向图的几何.
    pub geometry: VolumeGeometry,
}

/// 加载 `bundle` 的方向图、分割掩膜与 (可选的) 端点掩膜.
pub fn load_bundle(layout: &SubjectLayout, bundle: &str) -> Result<LoadedBundle, VolumeIoError> {
    let (field, geometry) = open_nifti_4d(layout.tom(bundle))?;
    let tom = BundleTom::new(bundle, field)?;
    let (mask, _) = open_mask(layout.bundle_mask(bundle))?;

    let begin = layout.ending_mask(bundle, Ending::Begin);
    let end = layout.ending_mask(bundle, Ending::End);
    let endings = if begin.is_file() && end.is_file() {
        let (b, _) = open_mask(begin)?;
        let (e, _) = open_mask(end)?;
        Some(BundleEndpoints::new(bundle, b, e)?)
    } else {
        None
    };
    Ok(LoadedBundle {
        tom,
        mask: BundleMask::new(bundle, mask),
        endings,
        geometry,
    })
}
