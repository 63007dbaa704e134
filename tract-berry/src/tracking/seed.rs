use crate::Point3;
use ndarray::ArrayView3;
use rand::Rng;

/// 在 `mask` 内随机生成 `count` 个种子点 (体素坐标).
///
/// 先均匀地随机选取前景体素, 再在该体素内均匀取点. 掩膜为空时返回空列表.
pub fn random_seeds<R: Rng + ?Sized>(
    mask: ArrayView3<bool>,
    count: usize,
    rng: &mut R,
) -> Vec<Point3> {
    let voxels: Vec<_> = mask
        .indexed_iter()
        .filter_map(|(p, v)| v.then_some(p))
        .collect();
    if voxels.is_empty() {
        return vec![];
    }
    (0..count)
        .map(|_| {
            let (x, y, z) = voxels[rng.gen_range(0..voxels.len())];
            [x, y, z].map(|c| c as f64 + rng.gen_range(-0.5..0.5))
        })
        .collect()
}
