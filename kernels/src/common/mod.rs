mod arena;
mod blob;
mod diversity;
mod element;
mod error;
mod tensor;
mod workspace;

pub use arena::{Arena, ARENA_ALIGN};
pub use blob::Blob;
pub use diversity::{SchemeCacheSize, SchemeDiversity};
pub use element::Element;
pub use error::{functions::*, LaunchError, LaunchErrorKind, SchemeError, SchemeErrorKind};
pub use tensor::TensorLayout;
pub use workspace::Workspace;

pub(crate) mod utils {
    use super::{rank_not_support, type_mismatch, type_not_support, SchemeError};
    use digit_layout::DigitLayout;

    #[inline]
    pub(crate) fn type_distinct(pairs: &[DigitLayout]) -> Result<DigitLayout, SchemeError> {
        let [dt, tail @ ..] = pairs else {
            unreachable!("pairs empty");
        };
        if tail.iter().all(|it| it == dt) {
            Ok(*dt)
        } else {
            Err(type_mismatch(format!("{pairs:?} are not distinct")))
        }
    }

    /// 元素字节数，只支持按字节对齐的类型。
    #[inline]
    pub(crate) fn unit_size(dt: DigitLayout) -> Result<usize, SchemeError> {
        dt.nbytes()
            .ok_or_else(|| type_not_support(format!("{dt:?} is not byte aligned")))
    }

    #[inline]
    pub(crate) fn rank_error(arg: &str, expected: usize, actual: usize) -> SchemeError {
        rank_not_support(format!("{arg}.ndim = {actual}, {expected} expected"))
    }

    #[inline]
    pub(crate) fn dim_distinct(args: &[usize]) -> Option<usize> {
        let (&ans, others) = args.split_first()?;
        others.iter().all(|&x| x == ans).then_some(ans)
    }
}
