use super::Planes;
use crate::{
    pool::{Axis, PoolType},
    Element,
};
use num_traits::{Float, Zero};
use std::mem::{align_of, size_of};

/// 窗口边界表需要的字节数，包括对齐余量。
pub(super) fn table_size(axes: &[Axis; 2]) -> usize {
    (axes[0].out() + axes[1].out()) * size_of::<[usize; 2]>() + align_of::<usize>()
}

/// 在工作空间中填写两个维度的窗口边界，返回（行，列）边界表。
pub(super) fn fill_table<'w>(
    workspace: &'w mut [u8],
    axes: &[Axis; 2],
) -> (&'w [[usize; 2]], &'w [[usize; 2]]) {
    let [hy, wy] = axes.map(|axis| axis.out());
    // SAFETY: [usize; 2] 没有无效的位模式
    let (_, table, _) = unsafe { workspace.align_to_mut::<[usize; 2]>() };
    let (rows, cols) = table[..hy + wy].split_at_mut(hy);
    for (i, row) in rows.iter_mut().enumerate() {
        let range = axes[0].window(i);
        *row = [range.start, range.end];
    }
    for (j, col) in cols.iter_mut().enumerate() {
        let range = axes[1].window(j);
        *col = [range.start, range.end];
    }
    (rows, cols)
}

/// 通用实现：逐个输出计算窗口，在窗口与有效区域的交集上归约。支持任意步长。
pub(super) fn pool<T: Element>(
    planes: &Planes<T>,
    ty: PoolType,
    exclusive: bool,
    axes: &[Axis; 2],
    rows: &[[usize; 2]],
    cols: &[[usize; 2]],
) {
    let [_, _, sxh, sxw] = planes.sx;
    let [_, _, syh, syw] = planes.sy;
    planes.for_each(|x, y| {
        for (i, &[r0, r1]) in rows.iter().enumerate() {
            for (j, &[c0, c1]) in cols.iter().enumerate() {
                debug_assert!(r0 < r1 && c0 < c1);
                let get = |r: usize, c: usize| {
                    unsafe { x.byte_offset(r as isize * sxh + c as isize * sxw).read() }.widen()
                };
                let ans = match ty {
                    PoolType::Max => {
                        let mut max = T::Acc::neg_infinity();
                        for r in r0..r1 {
                            for c in c0..c1 {
                                max = max.max(get(r, c))
                            }
                        }
                        max
                    }
                    PoolType::Avg => {
                        let mut sum = T::Acc::zero();
                        for r in r0..r1 {
                            for c in c0..c1 {
                                sum = sum + get(r, c)
                            }
                        }
                        let div = if exclusive {
                            (r1 - r0) * (c1 - c0)
                        } else {
                            axes[0].extent(i) * axes[1].extent(j)
                        };
                        sum / T::count(div)
                    }
                };
                unsafe {
                    y.byte_offset(i as isize * syh + j as isize * syw)
                        .write(T::narrow(ans))
                }
            }
        }
    })
}
