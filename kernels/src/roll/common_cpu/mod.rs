use super::{args::Meta, Args, Roll};
use crate::{
    args_not_support, common_cpu::Cpu, Arena, ByteOf, DataLayoutType, DeclType, Kernel,
    LaunchError, OpCharacter, ParamBlock, Place, PrecisionType, QueueAlloc, SchemeError, TargetType,
    TypeInferHandler,
};
use itertools::izip;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::{collections::HashMap, ptr::copy_nonoverlapping};

use crate::Operator as _;

pub struct Operator;

impl Roll<Cpu> for Operator {}

impl crate::Operator for Operator {
    type Hardware = Cpu;
    type Args = Args<Cpu>;

    #[inline]
    fn new(_node: &Self::Hardware) -> Self {
        Self
    }

    #[inline]
    fn scheme(
        &mut self,
        args: &Self::Args,
        _max_workspace_size: usize,
    ) -> Result<usize, SchemeError> {
        let _meta = args.meta()?;
        Ok(0)
    }

    fn launch<QA>(
        &self,
        args: &Self::Args,
        _workspace: &mut [ByteOf<Self::Hardware>],
        _queue_alloc: &QA,
    ) -> Result<(), LaunchError>
    where
        QA: QueueAlloc<Hardware = Self::Hardware>,
    {
        let Meta { unit, shape, axes } = args.meta()?;
        let Args {
            y_layout,
            y_base,
            x_layout,
            x_base,
            shifts,
            ..
        } = args;

        let count = shape.iter().product::<usize>();
        if count == 0 {
            return Ok(());
        }
        if y_base.cast_const() == *x_base {
            return Err(args_not_support("roll can not run in place").into());
        }

        // 每个维度上的移动量，同一维度多次出现时累加
        let shifts = shifts.values();
        let flatten = axes.is_empty();
        let offsets = if flatten {
            vec![shifts[0].rem_euclid(count as i64) as usize]
        } else {
            let mut offsets = vec![0usize; shape.len()];
            for (&axis, &shift) in axes.iter().zip(&shifts) {
                let d = shape[axis];
                offsets[axis] = (offsets[axis] + shift.rem_euclid(d as i64) as usize) % d;
            }
            offsets
        };

        Scheme {
            unit,
            flatten,
            shape: &shape,
            offsets: &offsets,
            sx: x_layout.strides(),
            sy: y_layout.strides(),
            x: *x_base,
            y: *y_base,
        }
        .calculate(count);
        Ok(())
    }
}

struct Scheme<'a> {
    unit: usize,
    /// 展平时 `offsets` 只有一项。
    flatten: bool,
    shape: &'a [usize],
    offsets: &'a [usize],
    sx: &'a [isize],
    sy: &'a [isize],
    x: *const u8,
    y: *mut u8,
}

unsafe impl Send for Scheme<'_> {}
unsafe impl Sync for Scheme<'_> {}

impl Scheme<'_> {
    fn calculate(&self, count: usize) {
        (0..count).into_par_iter().for_each(|i| {
            let src = offset(i, self.shape, self.sx);
            let dst = match self.offsets {
                &[off] if self.flatten => offset((i + off) % count, self.shape, self.sy),
                offsets => {
                    let mut rem = i;
                    let mut dst = 0;
                    for (&d, &off, &s) in izip!(self.shape, offsets, self.sy).rev() {
                        dst += ((rem % d + off) % d) as isize * s;
                        rem /= d;
                    }
                    dst
                }
            };
            unsafe {
                copy_nonoverlapping(self.x.byte_offset(src), self.y.byte_offset(dst), self.unit)
            }
        })
    }
}

/// 行优先下标 `i` 在给定步长下的字节偏移。
fn offset(mut i: usize, shape: &[usize], strides: &[isize]) -> isize {
    let mut ans = 0;
    for (&d, &s) in shape.iter().zip(strides).rev() {
        ans += (i % d) as isize * s;
        i /= d;
    }
    ans
}

/// CPU 上的循环移动内核，与元素类型无关。
pub struct RollKernel {
    op: Operator,
}

impl RollKernel {
    pub fn new(node: &Cpu) -> Self {
        Self {
            op: Operator::new(node),
        }
    }
}

/// 输出的类型与实际输入 `X` 相同。
fn infer_out_type(inputs: &HashMap<String, DeclType>, out: &str) -> Option<DeclType> {
    match out {
        "Out" => inputs.get("X").copied(),
        _ => None,
    }
}

impl<QA: QueueAlloc<Hardware = Cpu>> Kernel<QA> for RollKernel {
    fn place(&self) -> Place {
        Place::new(TargetType::Host, PrecisionType::Any, DataLayoutType::Any)
    }

    fn prepare_for_run(&mut self, param: &ParamBlock<Cpu>, _ctx: &QA) -> Result<(), SchemeError> {
        self.op.scheme(param.get(), 0).map(drop)
    }

    fn run(
        &mut self,
        param: &ParamBlock<Cpu>,
        ctx: &QA,
        _arena: &Arena<QA>,
    ) -> Result<(), LaunchError> {
        self.op.launch(param.get(), &mut [], ctx)
    }

    fn type_infer_handler(&self) -> Option<TypeInferHandler> {
        Some(infer_out_type)
    }

    fn profile_info(&self) -> OpCharacter {
        OpCharacter::named("roll_bytes")
    }
}

#[cfg(test)]
mod test {
    use super::{Operator, RollKernel};
    use crate::{
        common_cpu::{Cpu, ThisThread},
        roll::{Args, Shifts},
        Arena, DataLayoutType, DeclType, KernelBase, LaunchErrorKind, Operator as _, Place,
        PrecisionType, SchemeErrorKind, TargetType, TensorLayout,
    };
    use digit_layout::types as ty;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashMap;

    /// 逐维度移动的朴素实现。
    fn shift_along(data: &mut [f32], shape: &[usize], axis: usize, shift: i64) {
        let d = shape[axis];
        if d == 0 {
            return;
        }
        let shift = shift.rem_euclid(d as i64) as usize;
        let inner = shape[axis + 1..].iter().product::<usize>();
        for block in data.chunks_mut(d * inner) {
            block.rotate_right(shift * inner)
        }
    }

    fn roll(x: &[f32], x_layout: TensorLayout, axes: Vec<isize>, shifts: Shifts<Cpu>) -> Vec<f32> {
        let mut y = vec![f32::NAN; x.len()];
        let args = Args::<Cpu> {
            y_layout: TensorLayout::new_contiguous(ty::F32, x_layout.shape()),
            y_base: y.as_mut_ptr().cast(),
            x_layout,
            x_base: x.as_ptr().cast(),
            axes,
            shifts,
        };
        let mut op = Operator::new(&Cpu);
        assert_eq!(op.scheme(&args, 0).unwrap(), 0);
        op.launch(&args, &mut [], &ThisThread).unwrap();
        y
    }

    #[test]
    fn test_axes() {
        let mut rng = StdRng::seed_from_u64(11);
        for axes in [vec![0], vec![2], vec![1, 3]] {
            for shape in [[1, 3, 9, 9], [3, 6, 18, 9]] {
                let x = (0..shape.iter().product::<usize>())
                    .map(|_| rng.gen_range(-1.0f32..1.0))
                    .collect::<Vec<_>>();
                let shifts = axes
                    .iter()
                    .map(|_| rng.gen_range(-20i64..20))
                    .collect::<Vec<_>>();

                let mut expected = x.clone();
                for (&axis, &shift) in axes.iter().zip(&shifts) {
                    shift_along(&mut expected, &shape, axis as usize, shift)
                }

                let layout = TensorLayout::new_contiguous(ty::F32, &shape);
                let y = roll(&x, layout.clone(), axes.clone(), Shifts::Static(shifts.clone()));
                assert_eq!(y, expected);

                let y = roll(&x, layout, axes.clone(), Shifts::Tensor {
                    layout: TensorLayout::new_contiguous(ty::I64, &[shifts.len()]),
                    base: shifts.as_ptr().cast(),
                });
                assert_eq!(y, expected);
            }
        }
    }

    #[test]
    fn test_negative_and_flatten() {
        let x = (0..6).map(|x| x as f32).collect::<Vec<_>>();
        let layout = TensorLayout::new_contiguous(ty::F32, &[2, 3]);

        let y = roll(&x, layout.clone(), vec![-1], Shifts::Static(vec![-1]));
        assert_eq!(y, [1., 2., 0., 4., 5., 3.]);

        let y = roll(&x, layout.clone(), vec![1, 1], Shifts::Static(vec![1, 1]));
        assert_eq!(y, [1., 2., 0., 4., 5., 3.]);

        let y = roll(&x, layout, vec![], Shifts::Static(vec![2]));
        assert_eq!(y, [4., 5., 0., 1., 2., 3.]);
    }

    #[test]
    fn test_strided() {
        // 转置的输入
        let x = (0..6).map(|x| x as f32).collect::<Vec<_>>();
        let layout = TensorLayout::new(ty::F32, &[3, 2], &[4, 12]);
        let y = roll(&x, layout.clone(), vec![0], Shifts::Static(vec![1]));
        // 逻辑上的输入为 [[0, 3], [1, 4], [2, 5]]
        assert_eq!(y, [2., 5., 0., 3., 1., 4.]);

        let y = roll(&x, layout, vec![], Shifts::Static(vec![1]));
        assert_eq!(y, [5., 0., 3., 1., 4., 2.]);
    }

    #[test]
    fn test_bf16() {
        let x = [0x3f80u16, 0x4000, 0x4040, 0x4080];
        let mut y = [0u16; 4];
        let layout = TensorLayout::new(ty::BF16, &[4], &[2]);
        let args = Args::<Cpu> {
            y_layout: layout.clone(),
            y_base: y.as_mut_ptr().cast(),
            x_layout: layout,
            x_base: x.as_ptr().cast(),
            axes: vec![0],
            shifts: Shifts::Static(vec![1]),
        };
        let mut op = Operator::new(&Cpu);
        assert_eq!(op.scheme(&args, 0).unwrap(), 0);
        op.launch(&args, &mut [], &ThisThread).unwrap();
        assert_eq!(y, [0x4080, 0x3f80, 0x4000, 0x4040]);
    }

    #[test]
    fn test_in_place() {
        let mut data = vec![0f32; 4];
        let ptr = data.as_mut_ptr().cast::<u8>();
        let layout = TensorLayout::new_contiguous(ty::F32, &[4]);
        let args = Args::<Cpu> {
            y_layout: layout.clone(),
            y_base: ptr,
            x_layout: layout,
            x_base: ptr.cast_const(),
            axes: vec![0],
            shifts: Shifts::Static(vec![1]),
        };
        let e = Operator::new(&Cpu)
            .launch(&args, &mut [], &ThisThread)
            .unwrap_err();
        assert_eq!(
            e.kind,
            LaunchErrorKind::Scheme(SchemeErrorKind::ArgsNotSupport)
        );
    }

    #[test]
    fn test_kernel() {
        let x = (0..8).map(|x| x as u8).collect::<Vec<_>>();
        let mut y = vec![0u8; 8];
        let layout = TensorLayout::new_contiguous(ty::U8, &[2, 4]);

        let mut kernel = KernelBase::<ThisThread>::new(Box::new(RollKernel::new(&Cpu)));
        kernel.set_op_type("roll");
        kernel.set_alias("def");
        kernel.set_context(ThisThread);
        kernel.set_param(Args::<Cpu> {
            y_layout: layout.clone(),
            y_base: y.as_mut_ptr(),
            x_layout: layout,
            x_base: x.as_ptr(),
            axes: vec![1],
            shifts: Shifts::Static(vec![3]),
        });
        kernel.launch(&mut Arena::new(ThisThread)).unwrap();
        assert_eq!(y, [1, 2, 3, 0, 5, 6, 7, 4]);
        assert_eq!(kernel.precision(), PrecisionType::Any);

        let handler = kernel.type_infer_handler().unwrap();
        let fp16 = DeclType::tensor(Place::new(
            TargetType::Host,
            PrecisionType::FP16,
            DataLayoutType::NCHW,
        ));
        let inputs = HashMap::from([("X".to_string(), fp16)]);
        assert_eq!(handler(&inputs, "Out"), Some(fp16));
        assert_eq!(handler(&inputs, "X"), None);
    }
}
