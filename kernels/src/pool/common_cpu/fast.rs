//! 固定几何形状的池化特化实现，只支持连续存储的单精度张量。
//!
//! 每个特化实现在窗口完全落在输入内部的位置展开固定尺寸的循环，边缘位置按裁剪后的窗口计算。
//! 归约顺序和除数都与通用实现相同，结果逐位一致。

use super::Planes;
use crate::pool::PoolType;
use std::ops::Range;

pub(super) trait Reduce {
    fn init() -> f32;
    fn fold(acc: f32, x: f32) -> f32;
    /// `count` 是窗口中有效像素的数量，`full` 是窗口尺寸。
    fn finish(acc: f32, count: usize, full: usize, exclusive: bool) -> f32;
}

pub(super) struct Max;
pub(super) struct Avg;

impl Reduce for Max {
    #[inline(always)]
    fn init() -> f32 {
        f32::NEG_INFINITY
    }
    #[inline(always)]
    fn fold(acc: f32, x: f32) -> f32 {
        acc.max(x)
    }
    #[inline(always)]
    fn finish(acc: f32, _count: usize, _full: usize, _exclusive: bool) -> f32 {
        acc
    }
}

impl Reduce for Avg {
    #[inline(always)]
    fn init() -> f32 {
        0.
    }
    #[inline(always)]
    fn fold(acc: f32, x: f32) -> f32 {
        acc + x
    }
    #[inline(always)]
    fn finish(acc: f32, count: usize, full: usize, exclusive: bool) -> f32 {
        let div = if exclusive { count } else { full };
        acc / div as f32
    }
}

/// 特化实现的匹配条件。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(super) enum FastKey {
    /// 方形窗口，两个维度步长相同，四周填充相同。
    Fixed {
        ty: PoolType,
        kernel: usize,
        stride: usize,
        pad: usize,
    },
    Global(PoolType),
}

pub(super) struct FastPath {
    pub key: FastKey,
    pub name: &'static str,
    pub f: fn(&Planes<f32>, bool),
}

impl std::fmt::Debug for FastPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

macro_rules! fixed {
    ($ty:ident $tag:literal: $k:literal $s:literal $p:literal) => {
        FastPath {
            key: FastKey::Fixed {
                ty: PoolType::$ty,
                kernel: $k,
                stride: $s,
                pad: $p,
            },
            name: concat!(
                "pool_",
                stringify!($k),
                "x",
                stringify!($k),
                "s",
                stringify!($s),
                "p",
                stringify!($p),
                "_",
                $tag
            ),
            f: fixed::<$k, $s, $p, $ty>,
        }
    };
}

/// 全部特化实现。
pub(super) static FAST_PATHS: &[FastPath] = &[
    fixed!(Max "max": 1 2 0),
    fixed!(Avg "avg": 1 2 0),
    fixed!(Max "max": 2 2 0),
    fixed!(Avg "avg": 2 2 0),
    fixed!(Max "max": 2 2 1),
    fixed!(Avg "avg": 2 2 1),
    fixed!(Max "max": 3 1 0),
    fixed!(Avg "avg": 3 1 0),
    fixed!(Max "max": 3 1 1),
    fixed!(Avg "avg": 3 1 1),
    fixed!(Max "max": 3 2 0),
    fixed!(Avg "avg": 3 2 0),
    fixed!(Max "max": 3 2 1),
    fixed!(Avg "avg": 3 2 1),
    fixed!(Max "max": 5 1 2),
    fixed!(Avg "avg": 5 1 2),
    FastPath {
        key: FastKey::Global(PoolType::Max),
        name: "pool_global_max",
        f: global::<Max>,
    },
    FastPath {
        key: FastKey::Global(PoolType::Avg),
        name: "pool_global_avg",
        f: global::<Avg>,
    },
];

pub(super) fn find(key: FastKey) -> Option<&'static FastPath> {
    FAST_PATHS.iter().find(|path| path.key == key)
}

/// 窗口完全落在长度为 `len` 的输入内部的输出下标范围。
fn interior<const K: usize, const S: usize, const P: usize>(len: usize, out: usize) -> Range<usize> {
    let start = P.div_ceil(S).min(out);
    let end = match (len + P).checked_sub(K) {
        Some(span) => (span / S + 1).min(out),
        None => 0,
    };
    start..end.max(start)
}

#[inline(always)]
fn clip<const K: usize, const S: usize, const P: usize>(i: usize, len: usize) -> Range<usize> {
    let start = (i * S) as isize - P as isize;
    let clip = |x: isize| x.clamp(0, len as isize) as usize;
    clip(start)..clip(start + K as isize)
}

fn fixed<const K: usize, const S: usize, const P: usize, R: Reduce>(
    planes: &Planes<f32>,
    exclusive: bool,
) {
    let &Planes { h, w, hy, wy, .. } = planes;
    let rows = interior::<K, S, P>(h, hy);
    let cols = interior::<K, S, P>(w, wy);
    planes.for_each(|x, y| {
        for i in 0..hy {
            for j in 0..wy {
                let ans = if rows.contains(&i) && cols.contains(&j) {
                    let x = unsafe { x.add((i * S - P) * w + (j * S - P)) };
                    let mut acc = R::init();
                    for r in 0..K {
                        for c in 0..K {
                            acc = R::fold(acc, unsafe { *x.add(r * w + c) })
                        }
                    }
                    R::finish(acc, K * K, K * K, exclusive)
                } else {
                    let r = clip::<K, S, P>(i, h);
                    let c = clip::<K, S, P>(j, w);
                    let count = r.len() * c.len();
                    let mut acc = R::init();
                    for r in r {
                        for c in c.clone() {
                            acc = R::fold(acc, unsafe { *x.add(r * w + c) })
                        }
                    }
                    R::finish(acc, count, K * K, exclusive)
                };
                unsafe { *y.add(i * wy + j) = ans }
            }
        }
    })
}

fn global<R: Reduce>(planes: &Planes<f32>, _exclusive: bool) {
    let len = planes.h * planes.w;
    planes.for_each(|x, y| {
        let x = unsafe { std::slice::from_raw_parts(x, len) };
        let acc = x.iter().fold(R::init(), |acc, &x| R::fold(acc, x));
        unsafe { *y = R::finish(acc, len, len, true) }
    })
}
