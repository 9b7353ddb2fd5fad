//! 二维池化：NCHW 张量每个（样本，通道）平面上的滑动窗口最大值或平均值。

#[cfg(any(use_cpu, test))]
pub mod common_cpu;

mod args;
mod window;

pub use args::{Args, PoolConfig, PoolType};
pub use window::Axis;

crate::op_trait!(Pool);
