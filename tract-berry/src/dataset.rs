//! 数据集与受试者目录约定.
//!
//! 一个受试者的输出目录形如:
//!
//! ```text
//! {root}/
//!   peaks.nii.gz
//!   bundle_segmentations/{bundle}.nii.gz
//!   endings_segmentations/{bundle}_b.nii.gz
//!   endings_segmentations/{bundle}_e.nii.gz
//!   TOM/{bundle}.nii.gz
//!   TOM_trackings/{bundle}.bin
//!   Tractometry_{stat}.tsv
//! ```

use crate::tractometry::Statistic;
use std::path::{Path, PathBuf};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 端点掩膜的哪一端.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ending {
    /// 起点, 文件后缀 `_b`.
    Begin,

    /// 终点, 文件后缀 `_e`.
    End,
}

impl Ending {
    #[inline]
    fn suffix(&self) -> &'static str {
        match self {
            Self::Begin => "b",
            Self::End => "e",
        }
    }
}

/// 单个受试者的目录布局.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectLayout {
    root: PathBuf,
}

impl SubjectLayout {
    /// 以 `root` 为受试者根目录.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// 受试者根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 输入 peaks.
    pub fn peaks(&self) -> PathBuf {
        self.root.join("peaks.nii.gz")
    }

    /// 纤维束分割掩膜目录.
    pub fn bundle_dir(&self) -> PathBuf {
        self.root.join("bundle_segmentations")
    }

    /// 纤维束分割掩膜.
    pub fn bundle_mask(&self, bundle: &str) -> PathBuf {
        self.bundle_dir().join(format!("{bundle}.nii.gz"))
    }

    /// 端点掩膜目录.
    pub fn endings_dir(&self) -> PathBuf {
        self.root.join("endings_segmentations")
    }

    /// 端点掩膜.
    pub fn ending_mask(&self, bundle: &str, ending: Ending) -> PathBuf {
        self.endings_dir()
            .join(format!("{bundle}_{}.nii.gz", ending.suffix()))
    }

    /// 方向图目录.
    pub fn tom_dir(&self) -> PathBuf {
        self.root.join("TOM")
    }

    /// 方向图.
    pub fn tom(&self, bundle: &str) -> PathBuf {
        self.tom_dir().join(format!("{bundle}.nii.gz"))
    }

    /// 追踪结果目录.
    pub fn tracking_dir(&self) -> PathBuf {
        self.root.join("TOM_trackings")
    }

    /// 追踪结果.
    pub fn tracking(&self, bundle: &str) -> PathBuf {
        self.tracking_dir().join(format!("{bundle}.bin"))
    }

    /// 质控快照目录.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// 质控快照, 例如 `snapshots/CA_mask.png`.
    pub fn snapshot(&self, bundle: &str, what: &str) -> PathBuf {
        self.snapshot_dir().join(format!("{bundle}_{what}.png"))
    }

    /// tractometry 表.
    pub fn tractometry(&self, stat: Statistic) -> PathBuf {
        let s = match stat {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
        };
        self.root.join(format!("Tractometry_{s}.tsv"))
    }

    /// 同时具有方向图与纤维束掩膜文件的纤维束.
    ///
    /// 只检查文件是否存在, 不读取内容.
    pub fn trackable_bundles<'a, I>(&self, bundles: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        bundles
            .into_iter()
            .filter(|b| self.tom(b).is_file() && self.bundle_mask(b).is_file())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let l = SubjectLayout::new("/data/s01");
        assert_eq!(l.peaks(), PathBuf::from("/data/s01/peaks.nii.gz"));
        assert_eq!(
            l.bundle_mask("CST_left"),
            PathBuf::from("/data/s01/bundle_segmentations/CST_left.nii.gz")
        );
        assert_eq!(
            l.ending_mask("CA", Ending::End),
            PathBuf::from("/data/s01/endings_segmentations/CA_e.nii.gz")
        );
        assert_eq!(l.tom("CA"), PathBuf::from("/data/s01/TOM/CA.nii.gz"));
        assert_eq!(l.tracking("CA"), PathBuf::from("/data/s01/TOM_trackings/CA.bin"));
        assert_eq!(
            l.snapshot("CA", "tom"),
            PathBuf::from("/data/s01/snapshots/CA_tom.png")
        );
        assert_eq!(
            l.tractometry(Statistic::Std),
            PathBuf::from("/data/s01/Tractometry_std.tsv")
        );
    }

    #[test]
    fn test_missing_files_are_not_trackable() {
        let l = SubjectLayout::new("/nonexistent/subject");
        assert!(l.trackable_bundles(["CA", "MCP"]).is_empty());
    }
}
