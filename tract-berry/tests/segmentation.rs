//! 单视角端到端纤维束分割.

use ndarray::{s, Array4, ArrayView4};
use tract_berry::error::PredictorError;
use tract_berry::prelude::*;

const N: usize = 20;

/// 两个立方块: 块 0 的 x 分量为 0.01, 块 1 的 x 分量为 0.10.
fn peaks() -> PeakField {
    let mut data = Array4::<f32>::zeros((N, N, N, 9));
    data.slice_mut(s![2..8, 2..8, 2..8, 0]).fill(0.01);
    data.slice_mut(s![11..17, 10..16, 9..15, 0]).fill(0.10);
    // 次要 peak 不参与编码.
    data.slice_mut(s![2..17, 2..16, 2..15, 4]).fill(0.3);
    let g = VolumeGeometry::from_spacing([N; 3], [1.25; 3]).unwrap();
    PeakField::new(data, g).unwrap()
}

/// `|x 分量| = (k + 1) / 100` 的像素预测为第 `k` 个纤维束.
fn encoded(batch: ArrayView4<f32>) -> Result<Array4<f32>, PredictorError> {
    let (n, _, h, w) = batch.dim();
    let mut out = Array4::<f32>::zeros((n, 72, h, w));
    for ((b, c, y, x), v) in batch.indexed_iter() {
        if c != 0 || *v == 0.0 {
            continue;
        }
        let k = (v.abs() * 100.0).round() as usize;
        if (1..=72).contains(&k) {
            out[(b, k - 1, y, x)] = 1.0;
        }
    }
    Ok(out)
}

fn config() -> PipelineConfig {
    PipelineConfig::new(ExperimentType::TractSegmentation)
        .with_single_orientation(true)
        .with_flip_to_mni(false)
        .with_model_spacing(None)
        .with_model_size(None)
        .with_check_orientation(false)
}

#[test]
fn test_single_orientation_segmentation() {
    let pipe = Pipeline::new(config()).unwrap();
    let predictor = FnPredictor::new(9, 72, encoded);
    let p = peaks();

    let fused = pipe.fuse(&p, &predictor).unwrap();
    assert_eq!(fused.channels(), 72);
    assert_eq!(fused.geometry(), p.geometry());

    let SegmentationOutput::Bundles(masks) = pipe.postprocess(&fused).unwrap() else {
        panic!("期望纤维束分割结果");
    };
    assert_eq!(masks.len(), 72);
    let all = ClassSet::all_72();
    for (i, m) in masks.iter().enumerate() {
        assert_eq!(m.name(), all.name(i));
        match i {
            0 | 9 => assert_eq!(m.voxel_count(), 6 * 6 * 6, "纤维束 {}", m.name()),
            _ => assert!(m.is_empty(), "纤维束 {} 应为空", m.name()),
        }
    }
    assert!(masks[0].mask()[(4, 4, 4)]);
    assert!(masks[9].mask()[(12, 12, 12)]);
}

#[test]
fn test_small_blobs_are_removed() {
    // 块 0 只有 27 个体素, 低于默认门限.
    let mut data = Array4::<f32>::zeros((N, N, N, 9));
    data.slice_mut(s![2..5, 2..5, 2..5, 0]).fill(0.01);
    let g = VolumeGeometry::from_spacing([N; 3], [1.25; 3]).unwrap();
    let p = PeakField::new(data, g).unwrap();

    let pipe = Pipeline::new(config()).unwrap();
    let out = pipe
        .segment(&p, &FnPredictor::new(9, 72, encoded))
        .unwrap();
    let SegmentationOutput::Bundles(masks) = out else {
        panic!("期望纤维束分割结果");
    };
    assert!(masks.iter().all(|m| m.is_empty()));
}

#[test]
fn test_wrong_output_channels_is_rejected() {
    let pipe = Pipeline::new(config()).unwrap();
    let predictor = FnPredictor::new(9, 71, |b: ArrayView4<f32>| {
        let (n, _, h, w) = b.dim();
        Ok(Array4::zeros((n, 71, h, w)))
    });
    assert!(pipe.fuse(&peaks(), &predictor).is_err());
}
