//! 实验类型与类别集合.
//!
//! 实验类型决定了每个纤维束占用的通道数以及视角融合规则;
//! 类别集合决定了通道到纤维束的映射.

use crate::consts::bundles::{ALL_72, TOM_20};
use crate::error::ConfigError;
use crate::fusion::FusionRule;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 实验类型. 在配置阶段确定一次, 之后不再改变.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExperimentType {
    /// 纤维束分割, 每束 1 个概率通道.
    TractSegmentation,

    /// 纤维束端点分割, 每束 2 个概率通道 (起点, 终点).
    EndingsSegmentation,

    /// 纤维束方向图 (TOM), 每束 1 个 3 维向量.
    OrientationField,

    /// 纤维密度回归, 每束 1 个非负标量通道.
    DensityRegression,
}

impl ExperimentType {
    /// 每个纤维束占用的通道数.
    #[inline]
    pub const fn channels_per_bundle(&self) -> usize {
        match self {
            Self::TractSegmentation | Self::DensityRegression => 1,
            Self::EndingsSegmentation => 2,
            Self::OrientationField => 3,
        }
    }

    /// 默认融合规则.
    #[inline]
    pub const fn fusion_rule(&self) -> FusionRule {
        match self {
            Self::OrientationField => FusionRule::SignAlignedMean,
            _ => FusionRule::Mean,
        }
    }

    /// 通道是否为概率值 (位于 \[0, 1\]).
    #[inline]
    pub const fn is_probability(&self) -> bool {
        matches!(self, Self::TractSegmentation | Self::EndingsSegmentation)
    }

    /// 通道是否为 3 维向量.
    #[inline]
    pub const fn is_vector(&self) -> bool {
        matches!(self, Self::OrientationField)
    }

    /// 实验名.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TractSegmentation => "tract_segmentation",
            Self::EndingsSegmentation => "endings_segmentation",
            Self::OrientationField => "TOM",
            Self::DensityRegression => "dm_regression",
        }
    }

    /// 该实验默认使用的类别集合.
    pub fn default_class_set(&self) -> ClassSet {
        match self {
            Self::OrientationField => ClassSet::tom_20(),
            _ => ClassSet::all_72(),
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExperimentType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tract_segmentation" => Ok(Self::TractSegmentation),
            "endings_segmentation" => Ok(Self::EndingsSegmentation),
            "TOM" => Ok(Self::OrientationField),
            "dm_regression" => Ok(Self::DensityRegression),
            other => Err(ConfigError::Parameter {
                name: "experiment",
                reason: format!("未知实验类型 `{other}`"),
            }),
        }
    }
}

/// 有序的纤维束名称集合. 相等性只比较名称序列.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassSet {
    names: Vec<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<String, usize>,
}

impl PartialEq for ClassSet {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for ClassSet {}

impl ClassSet {
    /// 从名称序列构造. 名称为空或有重复时返回 `Err`.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ConfigError::Parameter {
                name: "class_set",
                reason: "类别集合为空".to_string(),
            });
        }
        let mut index = HashMap::with_capacity(names.len());
        for (i, n) in names.iter().enumerate() {
            if index.insert(n.clone(), i).is_some() {
                return Err(ConfigError::Parameter {
                    name: "class_set",
                    reason: format!("重复的纤维束 `{n}`"),
                });
            }
        }
        Ok(Self { names, index })
    }

    /// 完整 72 束集合.
    pub fn all_72() -> Self {
        Self::from_static(&ALL_72)
    }

    /// TOM 使用的 20 束集合.
    pub fn tom_20() -> Self {
        Self::from_static(&TOM_20)
    }

    /// 静态表中的名称保证不重复.
    fn from_static(names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, index }
    }

    /// 纤维束个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 是否为空. 合法构造的集合永不为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 全部名称, 按通道顺序.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 第 `index` 个纤维束的名称. 越界时 panic.
    #[inline]
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// 查找纤维束的序号.
    pub fn index_of(&self, bundle: &str) -> Option<usize> {
        match self.index.get(bundle) {
            Some(&i) => Some(i),
            // 反序列化后的集合没有索引表.
            None => self.names.iter().position(|n| n == bundle),
        }
    }

    /// 给定实验类型下的总通道数.
    #[inline]
    pub fn channels(&self, experiment: ExperimentType) -> usize {
        self.len() * experiment.channels_per_bundle()
    }

    /// 第 `index` 个纤维束在给定实验类型下占用的通道区间.
    ///
    /// 端点分割为 `[起点, 终点]`, TOM 为 `[x, y, z]`.
    #[inline]
    pub fn channel_range(&self, index: usize, experiment: ExperimentType) -> Range<usize> {
        let k = experiment.channels_per_bundle();
        index * k..(index + 1) * k
    }

    /// 校验给定通道数与实验类型是否匹配.
    pub fn check_channels(
        &self,
        experiment: ExperimentType,
        found: usize,
    ) -> Result<(), ConfigError> {
        let expected = self.channels(experiment);
        if expected == found {
            Ok(())
        } else {
            Err(ConfigError::Channels {
                experiment: experiment.name(),
                expected,
                found,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_counts() {
        let all = ClassSet::all_72();
        assert_eq!(all.channels(ExperimentType::TractSegmentation), 72);
        assert_eq!(all.channels(ExperimentType::EndingsSegmentation), 144);
        assert_eq!(all.channels(ExperimentType::DensityRegression), 72);
        assert_eq!(ClassSet::tom_20().channels(ExperimentType::OrientationField), 60);
    }

    #[test]
    fn test_channel_range() {
        let all = ClassSet::all_72();
        let i = all.index_of("CST_right").unwrap();
        assert_eq!(i, 15);
        assert_eq!(all.channel_range(i, ExperimentType::EndingsSegmentation), 30..32);
        assert_eq!(all.channel_range(i, ExperimentType::OrientationField), 45..48);
        assert!(all.index_of("nope").is_none());
    }

    #[test]
    fn test_class_set_rejects_duplicates() {
        assert!(ClassSet::new(["CA", "CA"]).is_err());
        assert!(ClassSet::new(Vec::<String>::new()).is_err());
        assert_eq!(ClassSet::new(["CA", "MCP"]).unwrap().len(), 2);
    }

    #[test]
    fn test_equality_ignores_index() {
        let a = ClassSet::new(["CA", "MCP"]).unwrap();
        let bare = ClassSet {
            names: a.names.clone(),
            index: HashMap::new(),
        };
        assert_eq!(a, bare);
        assert_eq!(bare.index_of("MCP"), Some(1));
        assert_ne!(a, ClassSet::new(["MCP", "CA"]).unwrap());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialized_equals_source() {
        let a = ClassSet::tom_20();
        let bytes = bincode::serialize(&a).unwrap();
        let b: ClassSet = bincode::deserialize(&bytes).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.index_of("CST_left"), a.index_of("CST_left"));
    }

    #[test]
    fn test_check_channels() {
        let s = ClassSet::tom_20();
        assert!(s.check_channels(ExperimentType::OrientationField, 60).is_ok());
        assert_eq!(
            s.check_channels(ExperimentType::OrientationField, 20),
            Err(ConfigError::Channels {
                experiment: "TOM",
                expected: 60,
                found: 20
            })
        );
    }

    #[test]
    fn test_experiment_round_trip_name() {
        for e in [
            ExperimentType::TractSegmentation,
            ExperimentType::EndingsSegmentation,
            ExperimentType::OrientationField,
            ExperimentType::DensityRegression,
        ] {
            assert_eq!(e.name().parse::<ExperimentType>().unwrap(), e);
        }
    }
}
