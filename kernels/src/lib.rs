//! 推理引擎的执行核心：多后端内核抽象、共享临时内存和池化算子族。

mod common;
mod handle;

pub mod kernel;
pub mod param;
pub mod place;
pub mod pool;
pub mod profile;
pub mod registry;
pub mod roll;

pub use common::*;
pub use kernel::{IdentityError, Kernel, KernelBase, KernelIdentity, TypeInferHandler};
pub use param::{OpParam, ParamBlock};
pub use place::{DataLayoutType, DeclKind, DeclType, Place, PrecisionType, TargetType};
pub use profile::{BasicProfiler, EventHandle, OpCharacter, Profiler, TimingKind};
pub use registry::KernelRegistry;

#[cfg(any(use_cpu, test))]
pub use handle::common_cpu;

use std::ops::DerefMut;

/// 算力硬件抽象。
///
/// 约定硬件如何存储和运行。
/// 这个特质应该由管理硬件的基本单元的映射类型实现，通常是**硬件上下文**。
pub trait Hardware {
    /// 硬件的存储单元类型。
    type Byte;
    /// 硬件的任务队列类型。
    type Queue<'ctx>;
}

pub type ByteOf<H> = <H as Hardware>::Byte;
pub type QueueOf<'ctx, H> = <H as Hardware>::Queue<'ctx>;
pub type ArgsOf<O> = <O as Operator>::Args;
pub(crate) type MutPtr<H> = *mut <H as Hardware>::Byte;
pub(crate) type ConstPtr<H> = *const <H as Hardware>::Byte;

pub trait Alloc<M> {
    fn alloc(&self, size: usize) -> M;
    fn free(&self, mem: M);
}

/// 绑定到队列的分配器。
///
/// 内核绑定的执行上下文就是它：既提供任务队列，也负责分配设备存储。
pub trait QueueAlloc: Alloc<Self::DevMem> {
    /// 队列分配器对应的硬件。
    type Hardware: Hardware;
    /// 分配器分配和回收的对象，表示对某块存储区域的所有权。
    ///
    /// 对象移动时，它解引用得到的存储区域不能移动。
    type DevMem: DerefMut<Target = [ByteOf<Self::Hardware>]>;
    /// 分配器对应的队列。
    fn queue(&self) -> &QueueOf<Self::Hardware>;
}

/// 算子。
///
/// 一个算子是某种计算在某种硬件上的实现，不持有参数和张量。
/// [`Kernel`] 在它之上管理参数绑定、初始化时机和临时内存。
pub trait Operator {
    /// 执行算子的硬件。
    type Hardware: Hardware;
    /// 算子的参数类型。
    type Args;

    /// 在指定硬件上创建算子实例。
    fn new(node: &Self::Hardware) -> Self;

    /// 规划执行方案。
    ///
    /// 根据参数确定执行方案（例如选择特化实现），并返回执行需要的工作空间容量。
    /// 返回值将保证不大于最大工作空间容量；如果执行时实际需要更多空间，将产生运行时分配。
    fn scheme(
        &mut self,
        args: &Self::Args,
        max_workspace_size: usize,
    ) -> Result<usize, SchemeError>;

    /// 发射算子到任务队列。
    ///
    /// 如果算子实际需要的工作空间大于通过参数提供的工作空间，将通过队列分配器分配和释放工作空间。
    fn launch<QA>(
        &self,
        args: &Self::Args,
        workspace: &mut [ByteOf<Self::Hardware>],
        queue_alloc: &QA,
    ) -> Result<(), LaunchError>
    where
        QA: QueueAlloc<Hardware = Self::Hardware>;
}

macro_rules! op_trait {
    ($name:ident $($body:item)*) => {
        pub trait $name<H: $crate::Hardware>:
            $crate::Operator<
            Hardware = H,
            Args = Args<H>,
        >{$($body)*}
    };
}

pub(crate) use op_trait;
