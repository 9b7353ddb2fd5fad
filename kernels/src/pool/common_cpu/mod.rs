mod basic;
mod fast;

use super::{args::Meta, Args, Axis, Pool, PoolConfig};
use crate::{
    common_cpu::Cpu,
    kernel::contract_violation,
    type_not_support, Arena, ByteOf, DataLayoutType, Kernel, LaunchError, OpCharacter, ParamBlock,
    Place, PrecisionType, QueueAlloc, SchemeCacheSize, SchemeDiversity, SchemeError, TargetType,
    Workspace,
};
use digit_layout::{types as ty, DigitLayout};
use fast::{FastKey, FastPath};
use half::f16;
use log::debug;
use lru::LruCache;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::sync::Mutex;

use crate::Operator as _;

pub struct Operator {
    schemes: Mutex<LruCache<SchemeKey, Plan>>,
}

impl Pool<Cpu> for Operator {}

impl crate::Operator for Operator {
    type Hardware = Cpu;
    type Args = Args<Cpu>;

    fn new(_node: &Self::Hardware) -> Self {
        Self {
            schemes: SchemeCacheSize::default().new_cache(SchemeDiversity::Medium),
        }
    }

    fn scheme(
        &mut self,
        args: &Self::Args,
        max_workspace_size: usize,
    ) -> Result<usize, SchemeError> {
        let meta = args.meta()?;
        let plan = self.plan(args, &meta)?;
        Ok(plan.workspace.min(max_workspace_size))
    }

    fn launch<QA>(
        &self,
        args: &Self::Args,
        workspace: &mut [ByteOf<Self::Hardware>],
        queue_alloc: &QA,
    ) -> Result<(), LaunchError>
    where
        QA: QueueAlloc<Hardware = Self::Hardware>,
    {
        let meta = args.meta()?;
        let plan = self.plan(args, &meta)?;
        let Meta {
            dt,
            n,
            c,
            h,
            w,
            hy,
            wy,
        } = meta;
        let Args {
            y_layout,
            y_base,
            x_layout,
            x_base,
            config,
        } = args;
        let &[sxn, sxc, sxh, sxw] = x_layout.strides() else {
            unreachable!()
        };
        let &[syn, syc, syh, syw] = y_layout.strides() else {
            unreachable!()
        };

        macro_rules! planes {
            ($ty:ty) => {
                Planes::<$ty> {
                    n,
                    c,
                    h,
                    w,
                    hy,
                    wy,
                    sx: [sxn, sxc, sxh, sxw],
                    sy: [syn, syc, syh, syw],
                    x: x_base.cast(),
                    y: y_base.cast(),
                }
            };
        }

        if let Some(path) = plan.fast {
            (path.f)(&planes!(f32), config.exclusive);
            return Ok(());
        }

        let mut workspace = Workspace::new(queue_alloc, workspace, plan.workspace);
        let (rows, cols) = basic::fill_table(&mut workspace, &plan.axes);

        macro_rules! pool {
            ($ty:ty) => {
                basic::pool(
                    &planes!($ty),
                    config.ty,
                    config.exclusive,
                    &plan.axes,
                    rows,
                    cols,
                )
            };
        }

        match dt {
            ty::F16 => pool!(f16),
            ty::F32 => pool!(f32),
            ty::F64 => pool!(f64),
            _ => unreachable!(),
        }
        Ok(())
    }
}

impl Operator {
    /// 参数对应的实现名字。
    pub fn kernel_func_name(&self, args: &Args<Cpu>) -> Result<&'static str, SchemeError> {
        let meta = args.meta()?;
        Ok(self.plan(args, &meta)?.name())
    }

    fn plan(&self, args: &Args<Cpu>, meta: &Meta) -> Result<Plan, SchemeError> {
        let key = SchemeKey::new(args, meta);
        self.schemes
            .lock()
            .unwrap()
            .try_get_or_insert(key, || Plan::new(&key))
            .copied()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct SchemeKey {
    dt: DigitLayout,
    x: [usize; 4],
    contiguous: bool,
    config: PoolConfig,
}

impl SchemeKey {
    fn new(args: &Args<Cpu>, meta: &Meta) -> Self {
        Self {
            dt: meta.dt,
            x: [meta.n, meta.c, meta.h, meta.w],
            contiguous: args.x_layout.is_contiguous() && args.y_layout.is_contiguous(),
            config: args.config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Plan {
    axes: [Axis; 2],
    fast: Option<&'static FastPath>,
    workspace: usize,
}

impl Plan {
    fn new(key: &SchemeKey) -> Result<Self, SchemeError> {
        let &SchemeKey {
            dt,
            x: [_, _, h, w],
            contiguous,
            config,
        } = key;
        if !matches!(dt, ty::F16 | ty::F32 | ty::F64) {
            return Err(type_not_support(format!("pooling on {dt:?}")));
        }

        let axes = config.axes([h, w])?;
        for axis in &axes {
            if let Some(i) = axis.first_empty() {
                contract_violation(
                    "pool2d",
                    format_args!("window {i} of {axis:?} has no valid pixel"),
                )
            }
        }

        let fast = if dt == ty::F32 && contiguous {
            fast_key(&config, [h, w]).and_then(fast::find)
        } else {
            None
        };
        let workspace = if fast.is_some() {
            0
        } else {
            basic::table_size(&axes)
        };
        let ans = Self {
            axes,
            fast,
            workspace,
        };
        debug!("pool2d {dt:?} x{:?} {config:?} planned as {}", key.x, ans.name());
        Ok(ans)
    }

    fn name(&self) -> &'static str {
        self.fast.map_or("pool_basic", |path| path.name)
    }
}

/// 配置能够使用的特化实现的匹配条件。
fn fast_key(config: &PoolConfig, [h, w]: [usize; 2]) -> Option<FastKey> {
    let &PoolConfig {
        ty,
        kernel: [kh, kw],
        strides: [sh, sw],
        pads: [pt, pb, pl, pr],
        global,
        adaptive,
        use_quantizer,
        ..
    } = config;
    if use_quantizer || adaptive {
        return None;
    }
    if global || ([kh, kw] == [h, w] && [pt, pb, pl, pr] == [0; 4]) {
        return Some(FastKey::Global(ty));
    }
    (kh == kw && sh == sw && [pb, pl, pr].iter().all(|&p| p == pt)).then_some(FastKey::Fixed {
        ty,
        kernel: kh,
        stride: sh,
        pad: pt,
    })
}

/// 所有（样本，通道）平面。步长以字节为单位。
pub(super) struct Planes<T> {
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    hy: usize,
    wy: usize,
    sx: [isize; 4],
    sy: [isize; 4],
    x: *const T,
    y: *mut T,
}

unsafe impl<T> Send for Planes<T> {}
unsafe impl<T> Sync for Planes<T> {}

impl<T> Planes<T> {
    /// 并行处理每个平面，`f` 的参数是平面的输入和输出起始位置。
    fn for_each(&self, f: impl Fn(*const T, *mut T) + Sync) {
        (0..self.n * self.c).into_par_iter().for_each(|i| {
            let n = (i / self.c) as isize;
            let c = (i % self.c) as isize;
            let x = unsafe { self.x.byte_offset(n * self.sx[0] + c * self.sx[1]) };
            let y = unsafe { self.y.byte_offset(n * self.sy[0] + c * self.sy[1]) };
            f(x, y)
        })
    }
}

/// CPU 上的池化内核。
pub struct PoolKernel {
    op: Operator,
    /// 上次规划时的类型、形状、存储连续性和配置。
    planned: Option<SchemeKey>,
    workspace: usize,
    name: &'static str,
}

impl PoolKernel {
    pub fn new(node: &Cpu) -> Self {
        Self {
            op: Operator::new(node),
            planned: None,
            workspace: 0,
            name: "pool_basic",
        }
    }

    fn replan(&mut self, args: &Args<Cpu>, key: SchemeKey) -> Result<(), SchemeError> {
        self.workspace = self.op.scheme(args, usize::MAX)?;
        self.name = self.op.kernel_func_name(args)?;
        self.planned = Some(key);
        Ok(())
    }
}

impl<QA: QueueAlloc<Hardware = Cpu>> Kernel<QA> for PoolKernel {
    fn place(&self) -> Place {
        Place::new(
            TargetType::Host,
            PrecisionType::Float,
            DataLayoutType::NCHW,
        )
    }

    fn prepare_for_run(&mut self, param: &ParamBlock<Cpu>, _ctx: &QA) -> Result<(), SchemeError> {
        let args = param.get::<Args<Cpu>>();
        self.replan(args, SchemeKey::new(args, &args.meta()?))
    }

    fn reinit_when_needed(
        &mut self,
        param: &ParamBlock<Cpu>,
        _ctx: &QA,
    ) -> Result<(), SchemeError> {
        let args = param.get::<Args<Cpu>>();
        let key = SchemeKey::new(args, &args.meta()?);
        if self.planned != Some(key) {
            debug!("pool2d replan for {key:?}, last {:?}", self.planned);
            self.replan(args, key)?
        }
        Ok(())
    }

    fn run(
        &mut self,
        param: &ParamBlock<Cpu>,
        ctx: &QA,
        arena: &Arena<QA>,
    ) -> Result<(), LaunchError> {
        let workspace = arena.take(self.workspace);
        self.op.launch(param.get(), workspace, ctx)
    }

    fn profile_info(&self) -> OpCharacter {
        OpCharacter::named(self.name)
    }
}
