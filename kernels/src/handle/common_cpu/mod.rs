use crate::{
    pool::common_cpu::PoolKernel, roll::common_cpu::RollKernel, Alloc, Blob, Hardware,
    KernelRegistry, QueueAlloc, QueueOf,
};

/// 通用 CPU。
#[derive(Clone, Copy, Debug)]
pub struct Cpu;

/// 在当前线程上同步执行的队列，同时是主存分配器。
#[derive(Clone, Copy, Default, Debug)]
pub struct ThisThread;

impl Hardware for Cpu {
    type Byte = u8;
    type Queue<'ctx> = ThisThread;
}

impl Alloc<Blob> for ThisThread {
    #[inline]
    fn alloc(&self, size: usize) -> Blob {
        Blob::new(size)
    }

    #[inline]
    fn free(&self, _mem: Blob) {}
}

impl QueueAlloc for ThisThread {
    type Hardware = Cpu;
    type DevMem = Blob;
    #[inline]
    fn queue(&self) -> &QueueOf<Self::Hardware> {
        self
    }
}

/// 注册 CPU 上的全部内核。
pub fn register_kernels(registry: &mut KernelRegistry<ThisThread>) {
    registry.register("pool2d", "def", || Box::new(PoolKernel::new(&Cpu)));
    registry.register("roll", "def", || Box::new(RollKernel::new(&Cpu)));
}
