use std::{error::Error, fmt};

/// 规划执行方案时发现的参数问题。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SchemeErrorKind {
    TypeNotSupport,
    TypeMismatch,
    RankNotSupport,
    RankMismatch,
    ShapeNotSupport,
    ShapeMismatch,
    StridesNotSupport,
    ArgsNotSupport,
}

#[derive(Clone, Debug)]
pub struct SchemeError {
    pub kind: SchemeErrorKind,
    pub info: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LaunchErrorKind {
    Scheme(SchemeErrorKind),
    ExecutionFailed,
}

#[derive(Clone, Debug)]
pub struct LaunchError {
    pub kind: LaunchErrorKind,
    pub info: String,
}

impl From<SchemeError> for LaunchError {
    #[inline]
    fn from(SchemeError { kind, info }: SchemeError) -> Self {
        Self {
            kind: LaunchErrorKind::Scheme(kind),
            info,
        }
    }
}

impl fmt::Display for SchemeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.info.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "{:?}: {}", self.kind, self.info)
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind: &dyn fmt::Debug = match &self.kind {
            LaunchErrorKind::Scheme(kind) => kind,
            kind => kind,
        };
        if self.info.is_empty() {
            write!(f, "{kind:?}")
        } else {
            write!(f, "{kind:?}: {}", self.info)
        }
    }
}

impl Error for SchemeError {}
impl Error for LaunchError {}

pub(super) mod functions {
    use super::{
        LaunchError, LaunchErrorKind::ExecutionFailed, SchemeError, SchemeErrorKind::*,
    };

    macro_rules! builder {
        ($ty:ident: $name:ident $kind:expr) => {
            #[inline]
            pub fn $name(info: impl Into<String>) -> $ty {
                $ty {
                    kind: $kind,
                    info: info.into(),
                }
            }
        };
    }

    builder!(SchemeError: type_not_support    TypeNotSupport   );
    builder!(SchemeError: type_mismatch       TypeMismatch     );
    builder!(SchemeError: rank_mismatch       RankMismatch     );
    builder!(SchemeError: rank_not_support    RankNotSupport   );
    builder!(SchemeError: shape_not_support   ShapeNotSupport  );
    builder!(SchemeError: shape_mismatch      ShapeMismatch    );
    builder!(SchemeError: strides_not_support StridesNotSupport);
    builder!(SchemeError: args_not_support    ArgsNotSupport   );

    builder!(LaunchError: execution_failed    ExecutionFailed  );
}

#[cfg(test)]
mod test {
    use super::{functions::*, LaunchError, LaunchErrorKind, SchemeErrorKind};

    #[test]
    fn test_display() {
        let e = shape_mismatch("x: [1, 2], y: [1, 3]");
        assert_eq!(e.kind, SchemeErrorKind::ShapeMismatch);
        assert_eq!(e.to_string(), "ShapeMismatch: x: [1, 2], y: [1, 3]");
        assert_eq!(args_not_support("").to_string(), "ArgsNotSupport");
        assert_eq!(execution_failed("oom").to_string(), "ExecutionFailed: oom");
    }

    #[test]
    fn test_scheme_into_launch() {
        fn plan() -> Result<(), LaunchError> {
            let scheme: Result<(), _> = Err(type_not_support("i8"));
            scheme?;
            Ok(())
        }
        let e = plan().unwrap_err();
        assert_eq!(
            e.kind,
            LaunchErrorKind::Scheme(SchemeErrorKind::TypeNotSupport)
        );
        assert_eq!(e.to_string(), "TypeNotSupport: i8");
    }
}
