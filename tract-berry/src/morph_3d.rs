//! 三维二值掩膜上的形态学操作.
//!
//! 所有操作都使用 6-连通 (钻石型) 邻域.

use crate::Idx3d;
use ndarray::{Array3, ArrayView3};
use std::collections::VecDeque;

/// 连通域.
pub type Area3d = Vec<Idx3d>;

/// 连通域集合.
pub type Areas3d = Vec<Area3d>;

/// 获取 `pos` 前后上下左右六个点的坐标.
///
/// 在 `shape` 范围外的坐标会被过滤掉, 不会包含在返回值中.
#[inline]
pub fn diamond_neighbours(shape: [usize; 3], (x, y, z): Idx3d) -> Vec<Idx3d> {
    let [a, b, c] = shape;
    [
        (x.wrapping_sub(1), y, z),
        (x.saturating_add(1), y, z),
        (x, y.wrapping_sub(1), z),
        (x, y.saturating_add(1), z),
        (x, y, z.wrapping_sub(1)),
        (x, y, z.saturating_add(1)),
    ]
    .into_iter()
    .filter(|&(i, j, k)| i < a && j < b && k < c && (i, j, k) != (x, y, z))
    .collect()
}

#[inline]
fn shape_of<T>(mask: &ArrayView3<T>) -> [usize; 3] {
    let (a, b, c) = mask.dim();
    [a, b, c]
}

/// 找出 `mask` 中所有值为 `target` 的 6-连通域. 顺序为首个体素的行优先顺序.
pub fn components(mask: ArrayView3<bool>, target: bool) -> Areas3d {
    let shape = shape_of(&mask);
    let mut ans = Areas3d::new();
    let mut bfs_q = VecDeque::with_capacity(16);
    let mut visited = Array3::<bool>::default(mask.dim());

    for (pos, v) in mask.indexed_iter() {
        if *v != target || visited[pos] {
            continue;
        }
        visited[pos] = true;
        bfs_q.push_back(pos);
        let mut this_area = Area3d::with_capacity(16);
        while let Some(cur) = bfs_q.pop_front() {
            this_area.push(cur);
            for n in diamond_neighbours(shape, cur) {
                if mask[n] == target && !visited[n] {
                    visited[n] = true;
                    bfs_q.push_back(n);
                }
            }
        }
        ans.push(this_area);
    }
    ans
}

/// 去除体素数小于 `min_size` 的前景连通域. 返回被去除的体素数.
pub fn remove_small_components(mask: &mut Array3<bool>, min_size: usize) -> usize {
    if min_size <= 1 {
        return 0;
    }
    let mut removed = 0;
    for area in components(mask.view(), true) {
        if area.len() < min_size {
            removed += area.len();
            for p in area {
                mask[p] = false;
            }
        }
    }
    removed
}

/// 填充空洞: 不与体边界相连的背景连通域被置为前景. 返回填充的体素数.
pub fn fill_holes(mask: &mut Array3<bool>) -> usize {
    let (a, b, c) = mask.dim();
    let on_border =
        |&(x, y, z): &Idx3d| x == 0 || y == 0 || z == 0 || x + 1 == a || y + 1 == b || z + 1 == c;
    let mut filled = 0;
    for area in components(mask.view(), false) {
        if !area.iter().any(on_border) {
            filled += area.len();
            for p in area {
                mask[p] = true;
            }
        }
    }
    filled
}

/// 二值膨胀 `iterations` 次 (每次以 6-邻域扩张一层).
pub fn dilate(mask: ArrayView3<bool>, iterations: usize) -> Array3<bool> {
    let shape = shape_of(&mask);
    let mut out = mask.to_owned();
    let mut frontier: Vec<Idx3d> = mask
        .indexed_iter()
        .filter_map(|(p, v)| v.then_some(p))
        .collect();
    for _ in 0..iterations {
        let mut next = Vec::with_capacity(frontier.len());
        for p in frontier {
            for n in diamond_neighbours(shape, p) {
                if !out[n] {
                    out[n] = true;
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    out
}

/// 体素数.
#[inline]
pub fn count(mask: ArrayView3<bool>) -> usize {
    mask.iter().filter(|v| **v).count()
}

/// 前景体素的质心 (体素坐标). 无前景时返回 `None`.
pub fn centroid(mask: ArrayView3<bool>) -> Option<crate::Point3> {
    let mut n = 0usize;
    let mut acc = [0f64; 3];
    for ((x, y, z), v) in mask.indexed_iter() {
        if *v {
            n += 1;
            acc[0] += x as f64;
            acc[1] += y as f64;
            acc[2] += z as f64;
        }
    }
    (n != 0).then(|| acc.map(|s| s / n as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(shape: (usize, usize, usize), lo: usize, hi: usize) -> Array3<bool> {
        Array3::from_shape_fn(shape, |(x, y, z)| {
            (lo..hi).contains(&x) && (lo..hi).contains(&y) && (lo..hi).contains(&z)
        })
    }

    #[test]
    fn test_diamond_neighbours_at_corner() {
        let n = diamond_neighbours([3, 3, 3], (0, 0, 0));
        assert_eq!(n.len(), 3);
        let n = diamond_neighbours([3, 3, 3], (1, 1, 1));
        assert_eq!(n.len(), 6);
        let n = diamond_neighbours([1, 1, 1], (0, 0, 0));
        assert!(n.is_empty());
    }

    #[test]
    fn test_components_and_small_removal() {
        let mut m = cube((10, 10, 10), 1, 5);
        m[(8, 8, 8)] = true;
        m[(8, 8, 7)] = true;
        let areas = components(m.view(), true);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].len(), 64);
        assert_eq!(remove_small_components(&mut m, 50), 2);
        assert!(!m[(8, 8, 8)]);
        assert_eq!(count(m.view()), 64);
    }

    #[test]
    fn test_diagonal_is_not_connected() {
        let mut m = Array3::<bool>::default((3, 3, 3));
        m[(0, 0, 0)] = true;
        m[(1, 1, 0)] = true;
        assert_eq!(components(m.view(), true).len(), 2);
    }

    #[test]
    fn test_fill_holes() {
        let mut m = cube((7, 7, 7), 1, 6);
        m[(3, 3, 3)] = false;
        m[(3, 3, 4)] = false;
        assert_eq!(fill_holes(&mut m), 2);
        assert!(m[(3, 3, 3)]);
        // 外部背景保持不变.
        assert!(!m[(0, 0, 0)]);
    }

    #[test]
    fn test_dilate() {
        let mut m = Array3::<bool>::default((5, 5, 5));
        m[(2, 2, 2)] = true;
        let d = dilate(m.view(), 1);
        assert_eq!(count(d.view()), 7);
        let d = dilate(m.view(), 2);
        assert_eq!(count(d.view()), 25);
        assert_eq!(dilate(m.view(), 0), m);
    }

    #[test]
    fn test_centroid() {
        let m = cube((6, 6, 6), 2, 4);
        assert_eq!(centroid(m.view()), Some([2.5; 3]));
        assert_eq!(centroid(Array3::<bool>::default((2, 2, 2)).view()), None);
    }
}
