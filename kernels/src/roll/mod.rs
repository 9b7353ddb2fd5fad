//! 沿指定维度循环移动张量元素。

#[cfg(any(use_cpu, test))]
pub mod common_cpu;

mod args;

pub use args::{Args, Shifts};

crate::op_trait!(Roll);
