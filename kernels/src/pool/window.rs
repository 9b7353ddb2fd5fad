use std::ops::Range;

/// 一个空间维度上的窗口划分。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Axis {
    /// 按窗口、步长和前端填充滑动。
    Sliding {
        len: usize,
        out: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    },
    /// 将输入均匀划分给 `out` 个输出。
    Adaptive { len: usize, out: usize },
    /// 唯一的窗口覆盖整个维度。
    Global { len: usize },
}

impl Axis {
    /// 输出长度。
    #[inline]
    pub fn out(&self) -> usize {
        match *self {
            Self::Sliding { out, .. } | Self::Adaptive { out, .. } => out,
            Self::Global { .. } => 1,
        }
    }

    /// 第 `i` 个窗口与有效输入区域的交集。
    pub fn window(&self, i: usize) -> Range<usize> {
        match *self {
            Self::Sliding {
                len,
                kernel,
                stride,
                pad,
                ..
            } => {
                let start = (i * stride) as isize - pad as isize;
                let end = start + kernel as isize;
                let clip = |x: isize| x.clamp(0, len as isize) as usize;
                clip(start)..clip(end)
            }
            Self::Adaptive { len, out } => i * len / out..((i + 1) * len).div_ceil(out),
            Self::Global { len } => 0..len,
        }
    }

    /// 不计排除填充时第 `i` 个窗口的长度。滑动窗口总是窗口尺寸，其他划分没有填充。
    #[inline]
    pub fn extent(&self, i: usize) -> usize {
        match *self {
            Self::Sliding { kernel, .. } => kernel,
            _ => self.window(i).len(),
        }
    }

    /// 第一个与有效区域没有交集的窗口。
    pub fn first_empty(&self) -> Option<usize> {
        (0..self.out()).find(|&i| self.window(i).is_empty())
    }
}
