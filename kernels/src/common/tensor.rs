use digit_layout::DigitLayout;
use ndarray_layout::ArrayLayout;

/// 张量的类型和布局。步长以字节为单位。
///
/// 张量的存储总是由调用者持有，算子参数中只出现布局和基址。
#[derive(Clone)]
pub struct TensorLayout {
    pub dt: DigitLayout,
    pub layout: ArrayLayout<4>,
}

impl TensorLayout {
    pub fn new(dt: DigitLayout, shape: &[usize], strides: &[isize]) -> Self {
        assert_eq!(shape.len(), strides.len());
        Self {
            dt,
            layout: ArrayLayout::new(shape, strides, 0),
        }
    }

    /// 按行优先连续布局创建张量布局。
    ///
    /// 数据类型必须是已知宽度的类型。
    pub fn new_contiguous(dt: DigitLayout, shape: &[usize]) -> Self {
        let Some(unit) = dt.nbytes() else {
            panic!("{dt:?} is not byte aligned")
        };
        let strides = contiguous_strides(shape, unit);
        Self::new(dt, shape, &strides)
    }

    #[inline]
    pub fn dt(&self) -> DigitLayout {
        self.dt
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// 元素总数。
    #[inline]
    pub fn count(&self) -> usize {
        self.shape().iter().product()
    }

    /// 判断张量是否按行优先紧密排列。
    pub fn is_contiguous(&self) -> bool {
        let Some(unit) = self.dt.nbytes() else {
            return false;
        };
        self.shape()
            .iter()
            .zip(self.strides())
            .zip(contiguous_strides(self.shape(), unit))
            .all(|((&d, &s), expected)| d == 1 || s == expected)
    }
}

fn contiguous_strides(shape: &[usize], unit: usize) -> Vec<isize> {
    let mut strides = shape
        .iter()
        .rev()
        .scan(unit as isize, |mul, &d| {
            let stride = *mul;
            *mul *= d as isize;
            Some(stride)
        })
        .collect::<Vec<_>>();
    strides.reverse();
    strides
}
