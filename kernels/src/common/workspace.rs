use crate::{ByteOf, QueueAlloc};
use log::warn;
use std::{
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

/// 算子执行时使用的工作空间。
///
/// 调用者提供的空间足够时直接借用；否则通过队列分配器临时分配，离开作用域时释放。
pub enum Workspace<'a, QA: QueueAlloc> {
    Ext(&'a mut [ByteOf<QA::Hardware>]),
    Int(ManuallyDrop<QA::DevMem>, &'a QA),
}

impl<'a, QA: QueueAlloc> Workspace<'a, QA> {
    pub fn new(queue_alloc: &'a QA, ext: &'a mut [ByteOf<QA::Hardware>], size: usize) -> Self {
        if ext.len() >= size {
            Self::Ext(ext)
        } else {
            warn!(
                "workspace of {} bytes is smaller than required {size} bytes, allocating",
                ext.len(),
            );
            let dev_mem = queue_alloc.alloc(size);
            Self::Int(ManuallyDrop::new(dev_mem), queue_alloc)
        }
    }

    /// 是否借用了调用者提供的空间。
    #[inline]
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Ext(_))
    }
}

impl<QA: QueueAlloc> Deref for Workspace<'_, QA> {
    type Target = [ByteOf<QA::Hardware>];
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self {
            Self::Ext(ext) => ext,
            Self::Int(dev_mem, _) => dev_mem,
        }
    }
}

impl<QA: QueueAlloc> DerefMut for Workspace<'_, QA> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Ext(ext) => ext,
            Self::Int(dev_mem, _) => dev_mem,
        }
    }
}

impl<QA: QueueAlloc> Drop for Workspace<'_, QA> {
    fn drop(&mut self) {
        match self {
            Self::Ext(_) => {}
            Self::Int(dev_mem, qa) => qa.free(unsafe { ManuallyDrop::take(dev_mem) }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Workspace;
    use crate::common_cpu::ThisThread;

    #[test]
    fn test_fallback() {
        let mut ext = [0u8; 32];
        {
            let ws = Workspace::new(&ThisThread, &mut ext, 16);
            assert!(ws.is_borrowed());
            assert_eq!(ws.len(), 32);
        }

        let mut ws = Workspace::new(&ThisThread, &mut ext, 100);
        assert!(!ws.is_borrowed());
        assert_eq!(ws.len(), 100);
        ws[99] = 1;
    }
}
