//! 🧠欢迎光临🍇
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point3};

pub use crate::config::{PipelineConfig, RetryBudget, TrackingConfig, Workers};
pub use crate::error::{ConfigError, Error, TrackingError, VolumeIoError};
pub use crate::experiment::{ClassSet, ExperimentType};
pub use crate::fusion::{FusionPolicy, FusionRule};
pub use crate::geometry::{Affine, MniFlip, VolumeGeometry};
pub use crate::inference::MultiAxisInferenceEngine;
pub use crate::post_proc::{PostProcessConfig, PostProcessor, ResolutionMode, ThresholdTable};
pub use crate::predictor::{FnPredictor, Predictor};
pub use crate::volume::{BundleEndpoints, BundleMask, BundleTom, DensityMap, FusedVolume, PeakField};

pub use crate::orientation::{FlipHypothesis, OrientationChecker};
pub use crate::pipeline::{Pipeline, SegmentationOutput};
pub use crate::tracking::{
    BundleTrackingInput, FnEngine, ProbabilisticTomTracker, TrackingEngine, TrackingOrchestrator,
    TrackingResult,
};
pub use crate::tractometry::{Statistic, Tractometry, TractometryTable};

pub use crate::dataset::{self, home_dataset_dir_with, SubjectLayout};
pub use crate::snapshot::Snapshot;
