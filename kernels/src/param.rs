//! 内核的参数块。

use crate::{kernel::contract_violation, pool, roll, Hardware};

/// 绑定到内核的参数，每种算子一个变体。
pub enum ParamBlock<H: Hardware> {
    Pool(pool::Args<H>),
    Roll(roll::Args<H>),
}

/// 可以放进 [`ParamBlock`] 的参数类型。
pub trait OpParam<H: Hardware>: Sized {
    /// 参数块中这种参数的名字，用于诊断信息。
    const NAME: &'static str;

    fn wrap(self) -> ParamBlock<H>;
    fn peek(block: &ParamBlock<H>) -> Option<&Self>;
    fn peek_mut(block: &mut ParamBlock<H>) -> Option<&mut Self>;
}

macro_rules! op_param {
    ($variant:ident($ty:ty) $name:literal) => {
        impl<H: Hardware> OpParam<H> for $ty {
            const NAME: &'static str = $name;

            #[inline]
            fn wrap(self) -> ParamBlock<H> {
                ParamBlock::$variant(self)
            }

            #[inline]
            fn peek(block: &ParamBlock<H>) -> Option<&Self> {
                match block {
                    ParamBlock::$variant(args) => Some(args),
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }

            #[inline]
            fn peek_mut(block: &mut ParamBlock<H>) -> Option<&mut Self> {
                match block {
                    ParamBlock::$variant(args) => Some(args),
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}

op_param!(Pool(pool::Args<H>) "pool2d");
op_param!(Roll(roll::Args<H>) "roll");

impl<H: Hardware> ParamBlock<H> {
    #[inline]
    pub fn new(param: impl OpParam<H>) -> Self {
        param.wrap()
    }

    /// 参数块中保存的参数的名字。
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pool(_) => <pool::Args<H> as OpParam<H>>::NAME,
            Self::Roll(_) => <roll::Args<H> as OpParam<H>>::NAME,
        }
    }

    #[inline]
    pub fn try_get<T: OpParam<H>>(&self) -> Option<&T> {
        T::peek(self)
    }

    /// 按类型读取参数。类型与保存的参数不符是调用者的错误，直接终止。
    pub fn get<T: OpParam<H>>(&self) -> &T {
        match T::peek(self) {
            Some(param) => param,
            None => contract_violation(
                "ParamBlock",
                format_args!("holds {} but {} requested", self.name(), T::NAME),
            ),
        }
    }

    pub fn get_mut<T: OpParam<H>>(&mut self) -> &mut T {
        let name = self.name();
        match T::peek_mut(self) {
            Some(param) => param,
            None => contract_violation(
                "ParamBlock",
                format_args!("holds {name} but {} requested", T::NAME),
            ),
        }
    }
}
