use crate::{ByteOf, QueueAlloc};
use log::trace;
use std::{
    cell::{Cell, RefCell},
    slice::from_raw_parts_mut,
};

/// 每块临时内存在存储块内的偏移按此对齐。
///
/// 主存上的存储块 [`Blob`](crate::Blob) 起点也按此对齐，因此 CPU 上取出的区域地址都按此对齐。
pub const ARENA_ALIGN: usize = 64;
const MIN_CHUNK: usize = 4 << 10;

/// 一次执行中被多个内核复用的临时内存池。
///
/// 一个执行会话为每个后端持有一个 [`Arena`]，每次内核发射前 [`reset`](Arena::reset)。
/// [`take`](Arena::take) 取得的区域在同一次执行内互不重叠，
/// 重置需要独占借用，因此区域不可能跨越重置被持有。
///
/// 内存池只缓存容量，不保证内容。容量按需增长，从不收缩。
pub struct Arena<QA: QueueAlloc> {
    queue_alloc: QA,
    chunks: RefCell<Vec<Chunk<QA>>>,
    offset: Cell<usize>,
    used: Cell<usize>,
}

struct Chunk<QA: QueueAlloc> {
    mem: QA::DevMem,
    base: *mut ByteOf<QA::Hardware>,
    len: usize,
}

impl<QA: QueueAlloc> Chunk<QA> {
    fn new(queue_alloc: &QA, len: usize) -> Self {
        let mut mem = queue_alloc.alloc(len);
        let base = mem.as_mut_ptr();
        let len = mem.len();
        Self { mem, base, len }
    }
}

impl<QA: QueueAlloc> Arena<QA> {
    #[inline]
    pub fn new(queue_alloc: QA) -> Self {
        Self {
            queue_alloc,
            chunks: RefCell::new(Vec::new()),
            offset: Cell::new(0),
            used: Cell::new(0),
        }
    }

    pub fn with_capacity(queue_alloc: QA, capacity: usize) -> Self {
        let chunks = if capacity == 0 {
            vec![]
        } else {
            vec![Chunk::new(&queue_alloc, capacity)]
        };
        Self {
            queue_alloc,
            chunks: RefCell::new(chunks),
            offset: Cell::new(0),
            used: Cell::new(0),
        }
    }

    #[inline]
    pub fn queue_alloc(&self) -> &QA {
        &self.queue_alloc
    }

    /// 已经持有的总容量。
    pub fn capacity(&self) -> usize {
        self.chunks.borrow().iter().map(|c| c.len).sum()
    }

    /// 本次执行已经取出的字节数，包括对齐填充。
    #[inline]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// 持有的存储块数量。重置后至多为 1。
    #[inline]
    pub fn chunks(&self) -> usize {
        self.chunks.borrow().len()
    }

    /// 取出至少 `size` 字节的临时内存，内容不确定。
    #[allow(clippy::mut_from_ref)]
    pub fn take(&self, size: usize) -> &mut [ByteOf<QA::Hardware>] {
        if size == 0 {
            return &mut [];
        }
        let mut chunks = self.chunks.borrow_mut();

        let start = self.offset.get().next_multiple_of(ARENA_ALIGN);
        let (base, start) = match chunks.last() {
            Some(chunk) if start + size <= chunk.len => (chunk.base, start),
            last => {
                let len = last
                    .map_or(0, |c| c.len * 2)
                    .max(size.next_multiple_of(ARENA_ALIGN))
                    .max(MIN_CHUNK);
                trace!("arena grows by {len} bytes");
                let chunk = Chunk::new(&self.queue_alloc, len);
                let base = chunk.base;
                chunks.push(chunk);
                (base, 0)
            }
        };

        let skipped = start - self.offset.get().min(start);
        self.offset.set(start + size);
        self.used.set(self.used.get() + skipped + size);
        // SAFETY: 区域在存储块内，且偏移只增不减，同一次执行内取出的区域互不重叠；
        // 存储块在 `reset` 或析构之前不释放，而两者都需要独占借用。
        unsafe { from_raw_parts_mut(base.add(start), size) }
    }

    /// 开始新一次执行，之前取出的区域全部失效。
    ///
    /// 如果上一次执行中增长出多个存储块，将它们合并为一块同等总容量的存储。
    pub fn reset(&mut self) {
        let chunks = self.chunks.get_mut();
        if chunks.len() > 1 {
            let total = chunks.iter().map(|c| c.len).sum();
            for chunk in chunks.drain(..) {
                self.queue_alloc.free(chunk.mem)
            }
            chunks.push(Chunk::new(&self.queue_alloc, total));
        }
        self.offset.set(0);
        self.used.set(0);
    }
}

impl<QA: QueueAlloc> Drop for Arena<QA> {
    fn drop(&mut self) {
        for chunk in self.chunks.get_mut().drain(..) {
            self.queue_alloc.free(chunk.mem)
        }
    }
}
