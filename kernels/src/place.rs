//! 内核的执行位置：目标硬件、数值精度和数据布局。

use digit_layout::{types as ty, DigitLayout};
use std::fmt;

macro_rules! place_enum {
    ($(#[$meta:meta])* $name:ident { $( $variant:ident = $code:literal : $text:literal ),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(u8)]
        pub enum $name {
            $( $variant = $code, )+
        }

        impl $name {
            /// 全部取值。
            pub const ALL: &'static [Self] = &[$( Self::$variant, )+];

            /// 序列化使用的整数编码。
            #[inline]
            pub const fn code(self) -> u8 {
                self as _
            }

            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

place_enum! {
    /// 目标硬件。
    TargetType {
        Unk    =  0: "unk"   ,
        Host   =  1: "host"  ,
        X86    =  2: "x86"   ,
        Cuda   =  3: "cuda"  ,
        Arm    =  4: "arm"   ,
        OpenCL =  5: "opencl",
        Any    =  6: "any"   ,
        Metal  = 17: "metal" ,
    }
}

place_enum! {
    /// 数值精度。
    PrecisionType {
        Unk   =  0: "unk"  ,
        Float =  1: "float",
        Int8  =  2: "int8" ,
        Int32 =  3: "int32",
        Any   =  4: "any"  ,
        FP16  =  5: "fp16" ,
        Bool  =  6: "bool" ,
        Int64 =  7: "int64",
        Int16 =  8: "int16",
        UInt8 =  9: "uint8",
        FP64  = 10: "fp64" ,
    }
}

place_enum! {
    /// 数据布局。
    DataLayoutType {
        Unk  = 0: "unk" ,
        NCHW = 1: "NCHW",
        Any  = 2: "any" ,
        NHWC = 3: "NHWC",
    }
}

impl PrecisionType {
    /// 精度对应的元素类型。`Any`、`Unk` 和 `Bool` 没有对应的元素类型。
    pub fn digit_layout(self) -> Option<DigitLayout> {
        Some(match self {
            Self::Float => ty::F32,
            Self::FP16 => ty::F16,
            Self::FP64 => ty::F64,
            Self::Int8 => ty::I8,
            Self::Int16 => ty::I16,
            Self::Int32 => ty::I32,
            Self::Int64 => ty::I64,
            Self::UInt8 => ty::U8,
            Self::Unk | Self::Any | Self::Bool => return None,
        })
    }

    pub fn from_digit_layout(dt: DigitLayout) -> Option<Self> {
        Some(match dt {
            ty::F32 => Self::Float,
            ty::F16 => Self::FP16,
            ty::F64 => Self::FP64,
            ty::I8 => Self::Int8,
            ty::I16 => Self::Int16,
            ty::I32 => Self::Int32,
            ty::I64 => Self::Int64,
            ty::U8 => Self::UInt8,
            _ => return None,
        })
    }
}

/// 内核注册时确定的（目标硬件，数值精度，数据布局）三元组，构造后不可修改。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    target: TargetType,
    precision: PrecisionType,
    layout: DataLayoutType,
}

impl Place {
    #[inline]
    pub const fn new(target: TargetType, precision: PrecisionType, layout: DataLayoutType) -> Self {
        Self {
            target,
            precision,
            layout,
        }
    }

    #[inline]
    pub const fn target(&self) -> TargetType {
        self.target
    }

    #[inline]
    pub const fn precision(&self) -> PrecisionType {
        self.precision
    }

    #[inline]
    pub const fn layout(&self) -> DataLayoutType {
        self.layout
    }

    /// `other` 是否可以接收本位置上的数据：`Any` 匹配任何取值。
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        use {DataLayoutType as L, PrecisionType as P, TargetType as T};
        (self.target == other.target || self.target == T::Any || other.target == T::Any)
            && (self.precision == other.precision
                || self.precision == P::Any
                || other.precision == P::Any)
            && (self.layout == other.layout || self.layout == L::Any || other.layout == L::Any)
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.target, self.precision, self.layout)
    }
}

/// 声明的参数类别。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DeclKind {
    Tensor,
    TensorList,
}

/// 算子接口上声明的参数类型，供外部类型检查使用。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DeclType {
    pub kind: DeclKind,
    pub place: Place,
}

impl DeclType {
    #[inline]
    pub const fn tensor(place: Place) -> Self {
        Self {
            kind: DeclKind::Tensor,
            place,
        }
    }
}
