use super::window::Axis;
use crate::{
    args_not_support, shape_mismatch, shape_not_support,
    utils::{dim_distinct, rank_error, type_distinct},
    ConstPtr, Hardware, MutPtr, SchemeError, TensorLayout,
};
use digit_layout::DigitLayout;
use std::{
    ptr::{null, null_mut},
    str::FromStr,
};

/// 池化的归约方式。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PoolType {
    Max,
    Avg,
}

impl FromStr for PoolType {
    type Err = SchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Self::Max),
            "avg" => Ok(Self::Avg),
            _ => Err(args_not_support(format!("pooling_type {s:?}"))),
        }
    }
}

/// 池化配置。
///
/// `adaptive` 时 `kernel` 是要求的输出尺寸；`global` 时窗口是整个平面，忽略窗口、步长和填充。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PoolConfig {
    pub ty: PoolType,
    pub kernel: [usize; 2],
    pub strides: [usize; 2],
    /// 上、下、左、右。
    pub pads: [usize; 4],
    pub global: bool,
    /// 平均池化的除数只计入有效像素。
    pub exclusive: bool,
    pub adaptive: bool,
    pub ceil_mode: bool,
    /// 量化模型中的池化，只使用通用实现。
    pub use_quantizer: bool,
}

impl PoolConfig {
    /// 对称填充的滑动窗口池化。
    pub fn new(ty: PoolType, kernel: [usize; 2], strides: [usize; 2], pads: [usize; 2]) -> Self {
        let [ph, pw] = pads;
        Self {
            ty,
            kernel,
            strides,
            pads: [ph, ph, pw, pw],
            global: false,
            exclusive: true,
            adaptive: false,
            ceil_mode: false,
            use_quantizer: false,
        }
    }

    pub fn global(ty: PoolType) -> Self {
        Self {
            global: true,
            ..Self::new(ty, [1, 1], [1, 1], [0, 0])
        }
    }

    pub fn adaptive(ty: PoolType, out: [usize; 2]) -> Self {
        Self {
            adaptive: true,
            ..Self::new(ty, out, [1, 1], [0, 0])
        }
    }

    /// 输入平面为 `[h, w]` 时的输出平面尺寸。
    pub fn output_size(&self, [h, w]: [usize; 2]) -> Result<[usize; 2], SchemeError> {
        let [hy, wy] = self.axes([h, w])?.map(|axis| axis.out());
        Ok([hy, wy])
    }

    /// 输入平面为 `[h, w]` 时两个空间维度上的窗口划分。
    pub fn axes(&self, [h, w]: [usize; 2]) -> Result<[Axis; 2], SchemeError> {
        let [pt, pb, pl, pr] = self.pads;
        Ok([
            self.axis(h, self.kernel[0], self.strides[0], [pt, pb])?,
            self.axis(w, self.kernel[1], self.strides[1], [pl, pr])?,
        ])
    }

    fn axis(
        &self,
        len: usize,
        kernel: usize,
        stride: usize,
        [lo, hi]: [usize; 2],
    ) -> Result<Axis, SchemeError> {
        if self.global {
            return Ok(Axis::Global { len });
        }
        if kernel == 0 {
            return Err(args_not_support("pooling window must not be empty"));
        }
        if self.adaptive {
            return Ok(Axis::Adaptive { len, out: kernel });
        }
        if stride == 0 {
            return Err(args_not_support("pooling stride must be positive"));
        }
        let Some(span) = (len + lo + hi).checked_sub(kernel) else {
            return Err(shape_not_support(format!(
                "window {kernel} is larger than padded input {len} + {lo} + {hi}"
            )));
        };
        let out = if self.ceil_mode {
            span.div_ceil(stride) + 1
        } else {
            span / stride + 1
        };
        Ok(Axis::Sliding {
            len,
            out,
            kernel,
            stride,
            pad: lo,
        })
    }
}

pub struct Args<H: Hardware> {
    pub y_layout: TensorLayout,
    pub y_base: MutPtr<H>,
    pub x_layout: TensorLayout,
    pub x_base: ConstPtr<H>,
    pub config: PoolConfig,
}

pub(super) struct Meta {
    pub dt: DigitLayout,
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
    pub hy: usize,
    pub wy: usize,
}

impl<H: Hardware> Args<H> {
    /// 只有布局的参数，用于规划执行方案。
    pub fn new_null(y_layout: TensorLayout, x_layout: TensorLayout, config: PoolConfig) -> Self {
        Self {
            y_layout,
            y_base: null_mut(),
            x_layout,
            x_base: null(),
            config,
        }
    }

    pub(super) fn meta(&self) -> Result<Meta, SchemeError> {
        let Self {
            y_layout: y,
            x_layout: x,
            config,
            ..
        } = self;

        let &[ny, cy, hy, wy] = y.shape() else {
            return Err(rank_error("y", 4, y.ndim()));
        };
        let &[nx, cx, h, w] = x.shape() else {
            return Err(rank_error("x", 4, x.ndim()));
        };

        let Some(n) = dim_distinct(&[nx, ny]) else {
            return Err(shape_mismatch(format!("x.n = {nx}, y.n = {ny}")));
        };
        let Some(c) = dim_distinct(&[cx, cy]) else {
            return Err(shape_mismatch(format!("x.c = {cx}, y.c = {cy}")));
        };
        let expected = config.output_size([h, w])?;
        if [hy, wy] != expected {
            return Err(shape_mismatch(format!(
                "y.hw = {:?}, {expected:?} expected",
                [hy, wy],
            )));
        }

        Ok(Meta {
            dt: type_distinct(&[y.dt(), x.dt()])?,
            n,
            c,
            h,
            w,
            hy,
            wy,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Args, PoolConfig, PoolType};
    use crate::{common_cpu::Cpu, SchemeErrorKind, TensorLayout};
    use digit_layout::types as ty;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_pool_type() {
        assert_eq!("max".parse::<PoolType>().unwrap(), PoolType::Max);
        assert_eq!("avg".parse::<PoolType>().unwrap(), PoolType::Avg);
        assert_eq!(
            "sum".parse::<PoolType>().unwrap_err().kind,
            SchemeErrorKind::ArgsNotSupport
        );
    }

    #[test]
    fn test_floor_and_ceil() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let k: usize = rng.gen_range(1..=7);
            let s: usize = rng.gen_range(1..=4);
            let p = rng.gen_range(0..k);
            let h = rng.gen_range(k.saturating_sub(2 * p).max(1)..=32);

            let floor = PoolConfig::new(PoolType::Max, [k, k], [s, s], [p, p]);
            let ceil = PoolConfig {
                ceil_mode: true,
                ..floor
            };
            let [hf, _] = floor.output_size([h, h]).unwrap();
            let [hc, _] = ceil.output_size([h, h]).unwrap();

            let span = h + 2 * p - k;
            assert_eq!(hf, span / s + 1);
            assert_eq!(hc, span.div_ceil(s) + 1);
            assert_eq!(hf != hc, span % s != 0);
        }
    }

    #[test]
    fn test_special_sizes() {
        let global = PoolConfig::global(PoolType::Avg);
        assert_eq!(global.output_size([13, 7]).unwrap(), [1, 1]);

        let adaptive = PoolConfig::adaptive(PoolType::Avg, [3, 5]);
        assert_eq!(adaptive.output_size([13, 7]).unwrap(), [3, 5]);

        let asymmetric = PoolConfig {
            pads: [0, 1, 2, 0],
            ..PoolConfig::new(PoolType::Max, [2, 2], [2, 2], [0, 0])
        };
        assert_eq!(asymmetric.output_size([4, 4]).unwrap(), [2, 3]);

        let large = PoolConfig::new(PoolType::Max, [5, 5], [1, 1], [0, 0]);
        assert_eq!(
            large.output_size([4, 8]).unwrap_err().kind,
            SchemeErrorKind::ShapeNotSupport
        );
        let zero = PoolConfig::new(PoolType::Max, [2, 2], [0, 1], [0, 0]);
        assert_eq!(
            zero.output_size([4, 8]).unwrap_err().kind,
            SchemeErrorKind::ArgsNotSupport
        );
    }

    #[test]
    fn test_meta() {
        let config = PoolConfig::new(PoolType::Max, [3, 3], [2, 2], [1, 1]);
        let x = TensorLayout::new_contiguous(ty::F32, &[2, 3, 9, 8]);

        let y = TensorLayout::new_contiguous(ty::F32, &[2, 3, 5, 4]);
        let meta = Args::<Cpu>::new_null(y, x.clone(), config).meta().unwrap();
        assert_eq!(
            [meta.n, meta.c, meta.h, meta.w, meta.hy, meta.wy],
            [2, 3, 9, 8, 5, 4]
        );

        let y = TensorLayout::new_contiguous(ty::F32, &[2, 3, 5, 5]);
        let e = Args::<Cpu>::new_null(y, x.clone(), config).meta().err().unwrap();
        assert_eq!(e.kind, SchemeErrorKind::ShapeMismatch);

        let y = TensorLayout::new_contiguous(ty::F32, &[2, 4, 5, 4]);
        let e = Args::<Cpu>::new_null(y, x.clone(), config).meta().err().unwrap();
        assert_eq!(e.kind, SchemeErrorKind::ShapeMismatch);

        let y = TensorLayout::new_contiguous(ty::F16, &[2, 3, 5, 4]);
        let e = Args::<Cpu>::new_null(y, x.clone(), config).meta().err().unwrap();
        assert_eq!(e.kind, SchemeErrorKind::TypeMismatch);

        let y = TensorLayout::new_contiguous(ty::F32, &[6, 5, 4]);
        let e = Args::<Cpu>::new_null(y, x, config).meta().err().unwrap();
        assert_eq!(e.kind, SchemeErrorKind::RankNotSupport);
    }
}
