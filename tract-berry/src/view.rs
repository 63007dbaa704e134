//! 三个推理视角及其坐标变换.
//!
//! 规范方向下数据按 `(x, y, z, c)` 组织. 视角变换把数据重排成
//! `(主轴, 行, 列, c)`, 推理沿主轴逐层切片; 逆变换把结果放回规范方向.

use crate::consts::VECTOR_COMPONENTS;
use ndarray::{Array4, ArrayView4, Axis};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 推理视角.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisView {
    /// 以 x 为主轴 (矢状面切片). 规范视角.
    X,

    /// 以 y 为主轴 (冠状面切片).
    Y,

    /// 以 z 为主轴 (轴状面切片).
    Z,
}

impl AxisView {
    /// 全部三个视角, 按融合时的顺序. 第一个是参考视角.
    pub const ALL: [AxisView; 3] = [AxisView::X, AxisView::Y, AxisView::Z];

    /// 单视角模式下使用的规范视角.
    #[inline]
    pub const fn canonical() -> Self {
        Self::X
    }

    /// 主轴在规范方向下的序号.
    #[inline]
    pub const fn primary_axis(&self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// 该视角的坐标变换.
    #[inline]
    pub const fn transform(&self) -> ViewTransform {
        match self {
            Self::X => ViewTransform::new([0, 1, 2], [false; 3]),
            Self::Y => ViewTransform::new([1, 0, 2], [false; 3]),
            Self::Z => ViewTransform::new([2, 0, 1], [false; 3]),
        }
    }
}

impl fmt::Display for AxisView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        };
        f.write_str(s)
    }
}

/// 空间轴置换 + 逐轴翻转.
///
/// 视角空间第 `i` 轴 = 规范空间第 `perm[i]` 轴, 且当 `flip[i]` 为真时方向相反.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ViewTransform {
    perm: [usize; 3],
    flip: [bool; 3],
}

impl ViewTransform {
    /// 构造. `perm` 必须是 `{0, 1, 2}` 的一个排列.
    pub const fn new(perm: [usize; 3], flip: [bool; 3]) -> Self {
        Self { perm, flip }
    }

    /// 置换.
    #[inline]
    pub fn perm(&self) -> [usize; 3] {
        self.perm
    }

    /// 翻转标记 (视角空间下).
    #[inline]
    pub fn flip(&self) -> [bool; 3] {
        self.flip
    }

    /// 逆置换: 规范空间第 `j` 轴 = 视角空间第 `inv[j]` 轴.
    pub fn inverse_perm(&self) -> [usize; 3] {
        let mut inv = [0; 3];
        for (i, p) in self.perm.iter().enumerate() {
            inv[*p] = i;
        }
        inv
    }

    /// 规范方向 -> 视角方向. 不拷贝数据.
    ///
    /// 向量分量不随之改变, 由调用方按 [`Self::component_signs`] 处理.
    pub fn forward<'a>(&self, data: ArrayView4<'a, f32>) -> ArrayView4<'a, f32> {
        let [a, b, c] = self.perm;
        let mut v = data.permuted_axes([a, b, c, 3]);
        for (i, f) in self.flip.iter().enumerate() {
            if *f {
                v.invert_axis(Axis(i));
            }
        }
        v
    }

    /// 规范方向下各向量分量在视角方向下的符号.
    pub fn component_signs(&self) -> [f32; 3] {
        let mut signs = [1.0; 3];
        for (i, f) in self.flip.iter().enumerate() {
            if *f {
                signs[self.perm[i]] = -1.0;
            }
        }
        signs
    }

    /// 视角方向 -> 规范方向.
    ///
    /// `vector` 为真时, 通道按 3 个一组视为规范坐标下的向量, 按翻转取反对应分量.
    pub fn inverse(&self, data: Array4<f32>, vector: bool) -> Array4<f32> {
        let mut data = data;
        for (i, f) in self.flip.iter().enumerate() {
            if *f {
                data.invert_axis(Axis(i));
            }
        }
        let [a, b, c] = self.inverse_perm();
        let mut data = data.permuted_axes([a, b, c, 3]);
        if vector {
            let signs = self.component_signs();
            let n = data.len_of(Axis(3));
            for ch in 0..n {
                if signs[ch % VECTOR_COMPONENTS] < 0.0 {
                    data.index_axis_mut(Axis(3), ch).mapv_inplace(|v| -v);
                }
            }
        }
        data.as_standard_layout().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Array4<f32> {
        Array4::from_shape_fn((2, 3, 4, 3), |(x, y, z, c)| {
            (x * 1000 + y * 100 + z * 10 + c) as f32
        })
    }

    #[test]
    fn test_forward_shapes() {
        let a = sample();
        assert_eq!(AxisView::X.transform().forward(a.view()).dim(), (2, 3, 4, 3));
        assert_eq!(AxisView::Y.transform().forward(a.view()).dim(), (3, 2, 4, 3));
        assert_eq!(AxisView::Z.transform().forward(a.view()).dim(), (4, 2, 3, 3));
    }

    #[test]
    fn test_forward_then_inverse_is_identity() {
        let a = sample();
        for view in AxisView::ALL {
            let t = view.transform();
            let fwd = t.forward(a.view()).to_owned();
            assert_eq!(t.inverse(fwd, false), a);
        }
    }

    #[test]
    fn test_flip_with_vectors() {
        let a = sample();
        let t = ViewTransform::new([2, 0, 1], [true, false, false]);
        assert_eq!(t.component_signs(), [1.0, 1.0, -1.0]);
        let v = t.forward(a.view());
        // 视角第 0 轴 (规范 z) 被翻转.
        assert_eq!(v[(0, 1, 2, 0)], a[(1, 2, 3, 0)]);

        let mut fwd = v.to_owned();
        for mut lane in fwd.lanes_mut(Axis(3)) {
            lane[2] = -lane[2];
        }
        assert_eq!(t.inverse(fwd, true), a);
    }

    #[test]
    fn test_view_misc() {
        assert_eq!(AxisView::canonical(), AxisView::X);
        assert_eq!(AxisView::Z.primary_axis(), 2);
        assert_eq!(AxisView::Y.to_string(), "y");
        assert_eq!(AxisView::Z.transform().inverse_perm(), [1, 2, 0]);
    }
}
