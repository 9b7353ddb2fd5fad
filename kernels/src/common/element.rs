use half::f16;
use num_traits::Float;

/// 池化等归约算子支持的元素类型。
///
/// 每种元素类型有一个累加类型：半精度在单精度上累加，其他类型在自身上累加。
pub trait Element: Copy + Send + Sync + 'static {
    /// 累加类型。
    type Acc: Float + Send + Sync;
    /// 转换到累加类型。
    fn widen(self) -> Self::Acc;
    /// 从累加类型转换回来。
    fn narrow(acc: Self::Acc) -> Self;
    /// 将计数转换为累加类型，用作平均值的除数。
    fn count(n: usize) -> Self::Acc;
}

impl Element for f16 {
    type Acc = f32;
    #[inline]
    fn widen(self) -> f32 {
        self.to_f32()
    }
    #[inline]
    fn narrow(acc: f32) -> Self {
        f16::from_f32(acc)
    }
    #[inline]
    fn count(n: usize) -> f32 {
        n as _
    }
}

impl Element for f32 {
    type Acc = f32;
    #[inline]
    fn widen(self) -> f32 {
        self
    }
    #[inline]
    fn narrow(acc: f32) -> Self {
        acc
    }
    #[inline]
    fn count(n: usize) -> f32 {
        n as _
    }
}

impl Element for f64 {
    type Acc = f64;
    #[inline]
    fn widen(self) -> f64 {
        self
    }
    #[inline]
    fn narrow(acc: f64) -> Self {
        acc
    }
    #[inline]
    fn count(n: usize) -> f64 {
        n as _
    }
}
