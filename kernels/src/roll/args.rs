use crate::{
    args_not_support, shape_mismatch, type_not_support,
    utils::{rank_error, type_distinct, unit_size},
    ConstPtr, Hardware, MutPtr, SchemeError, TensorLayout,
};
use digit_layout::types as ty;
use std::ptr::{null, null_mut};

/// 移动量。
pub enum Shifts<H: Hardware> {
    /// 构图时确定的移动量。
    Static(Vec<i64>),
    /// 执行时从一维 `I64` 张量中读取的移动量。
    Tensor {
        layout: TensorLayout,
        base: ConstPtr<H>,
    },
}

impl<H: Hardware> Shifts<H> {
    fn len(&self) -> Result<usize, SchemeError> {
        match self {
            Self::Static(shifts) => Ok(shifts.len()),
            Self::Tensor { layout, .. } => {
                if layout.dt() != ty::I64 {
                    return Err(type_not_support(format!(
                        "shifts tensor of {:?}, I64 expected",
                        layout.dt()
                    )));
                }
                match layout.shape() {
                    &[len] => Ok(len),
                    _ => Err(rank_error("shifts", 1, layout.ndim())),
                }
            }
        }
    }

    /// 读取移动量。张量形式的移动量在执行时读取。
    pub(super) fn values(&self) -> Vec<i64> {
        match self {
            Self::Static(shifts) => shifts.clone(),
            Self::Tensor { layout, base } => {
                let &[len] = layout.shape() else {
                    unreachable!()
                };
                let &[stride] = layout.strides() else {
                    unreachable!()
                };
                let base = base.cast::<i64>();
                (0..len as isize)
                    .map(|i| unsafe { base.byte_offset(i * stride).read_unaligned() })
                    .collect()
            }
        }
    }
}

pub struct Args<H: Hardware> {
    pub y_layout: TensorLayout,
    pub y_base: MutPtr<H>,
    pub x_layout: TensorLayout,
    pub x_base: ConstPtr<H>,
    /// 移动的维度，可以为负。为空时将张量视作一维。
    pub axes: Vec<isize>,
    pub shifts: Shifts<H>,
}

pub(super) struct Meta {
    /// 元素字节数。
    pub unit: usize,
    pub shape: Vec<usize>,
    /// 规范化的维度；为空表示展平。
    pub axes: Vec<usize>,
}

impl<H: Hardware> Args<H> {
    /// 只有布局和静态移动量的参数，用于规划执行方案。
    pub fn new_null(layout: TensorLayout, axes: Vec<isize>, shifts: Vec<i64>) -> Self {
        Self {
            y_layout: layout.clone(),
            y_base: null_mut(),
            x_layout: layout,
            x_base: null(),
            axes,
            shifts: Shifts::Static(shifts),
        }
    }

    pub(super) fn meta(&self) -> Result<Meta, SchemeError> {
        let Self {
            y_layout: y,
            x_layout: x,
            axes,
            shifts,
            ..
        } = self;

        let dt = type_distinct(&[y.dt(), x.dt()])?;
        if y.shape() != x.shape() {
            return Err(shape_mismatch(format!(
                "y{:?} != x{:?}",
                y.shape(),
                x.shape()
            )));
        }

        let n_shifts = shifts.len()?;
        let expected = axes.len().max(1);
        if n_shifts != expected {
            return Err(args_not_support(format!(
                "{n_shifts} shifts for {} axes",
                axes.len()
            )));
        }

        let ndim = x.ndim() as isize;
        let axes = axes
            .iter()
            .map(|&axis| {
                if (-ndim..ndim).contains(&axis) {
                    Ok(axis.rem_euclid(ndim) as usize)
                } else {
                    Err(args_not_support(format!("axis {axis} out of rank {ndim}")))
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Meta {
            unit: unit_size(dt)?,
            shape: x.shape().to_vec(),
            axes,
        })
    }
}
