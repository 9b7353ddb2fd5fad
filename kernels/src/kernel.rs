//! 内核：绑定了参数和执行上下文的算子实例，以及内核的身份编码。

use crate::{
    place::{DataLayoutType, DeclType, Place, PrecisionType, TargetType},
    profile::{OpCharacter, Profiler, TimingKind},
    Arena, LaunchError, OpParam, ParamBlock, QueueAlloc, SchemeError,
};
use log::{debug, error, trace};
use std::{collections::HashMap, error::Error, fmt, str::FromStr, sync::Arc};

/// 类型推导函数：根据输入参数名到声明类型的映射，推导指定输出参数的声明类型。
pub type TypeInferHandler = fn(&HashMap<String, DeclType>, &str) -> Option<DeclType>;

/// 内核的能力集合。每种（算子，执行位置）组合有一个实现。
///
/// 内核不直接对外，由 [`KernelBase`] 负责参数绑定和调用时机。
pub trait Kernel<QA: QueueAlloc> {
    /// 内核注册时的执行位置。
    fn place(&self) -> Place;

    /// 首次执行前调用一次。
    fn prepare_for_run(
        &mut self,
        _param: &ParamBlock<QA::Hardware>,
        _ctx: &QA,
    ) -> Result<(), SchemeError> {
        Ok(())
    }

    /// 每次执行前调用，检查是否需要重新准备，例如输入形状是否变化。
    fn reinit_when_needed(
        &mut self,
        _param: &ParamBlock<QA::Hardware>,
        _ctx: &QA,
    ) -> Result<(), SchemeError> {
        Ok(())
    }

    /// 执行计算。临时内存从 `arena` 中取。
    fn run(
        &mut self,
        _param: &ParamBlock<QA::Hardware>,
        _ctx: &QA,
        _arena: &Arena<QA>,
    ) -> Result<(), LaunchError> {
        contract_violation(
            &format!("kernel at {}", self.place()),
            format_args!("run() is not implemented"),
        )
    }

    /// 自定义类型推导。`None` 表示使用全局的类型推导规则。
    fn type_infer_handler(&self) -> Option<TypeInferHandler> {
        None
    }

    /// 报告给分析器的实现信息。
    fn profile_info(&self) -> OpCharacter {
        OpCharacter::default()
    }
}

#[cold]
#[track_caller]
pub(crate) fn contract_violation(who: &str, what: fmt::Arguments) -> ! {
    error!("{who}: {what}");
    panic!("{who}: {what}")
}

/// 内核实例。
///
/// 外部执行器先绑定参数和执行上下文，然后每个图步骤调用一次 [`launch`](Self::launch)。
pub struct KernelBase<QA: QueueAlloc> {
    kernel: Box<dyn Kernel<QA>>,
    op_type: String,
    alias: String,
    param: Option<ParamBlock<QA::Hardware>>,
    ctx: Option<QA>,
    is_first_epoch: bool,
    profiler: Option<(Arc<dyn Profiler>, usize)>,
    is_kernel_test: bool,
}

impl<QA: QueueAlloc> KernelBase<QA> {
    pub fn new(kernel: Box<dyn Kernel<QA>>) -> Self {
        Self {
            kernel,
            op_type: String::new(),
            alias: String::new(),
            param: None,
            ctx: None,
            is_first_epoch: true,
            profiler: None,
            is_kernel_test: true,
        }
    }

    #[inline]
    pub fn set_op_type(&mut self, op_type: impl Into<String>) {
        self.op_type = op_type.into()
    }

    #[inline]
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = alias.into()
    }

    #[inline]
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    #[inline]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// 绑定参数，替换之前绑定的参数。
    #[inline]
    pub fn set_param(&mut self, param: impl OpParam<QA::Hardware>) {
        self.param = Some(param.wrap())
    }

    #[inline]
    pub fn set_param_block(&mut self, param: ParamBlock<QA::Hardware>) {
        self.param = Some(param)
    }

    /// 按类型读取绑定的参数。
    pub fn param<T: OpParam<QA::Hardware>>(&self) -> &T {
        match &self.param {
            Some(param) => param.get(),
            None => contract_violation(&self.name(), format_args!("parameters not bound")),
        }
    }

    pub fn param_mut<T: OpParam<QA::Hardware>>(&mut self) -> &mut T {
        if self.param.is_none() {
            contract_violation(&self.name(), format_args!("parameters not bound"))
        }
        match &mut self.param {
            Some(param) => param.get_mut(),
            None => unreachable!(),
        }
    }

    /// 转移执行上下文的所有权到内核。
    #[inline]
    pub fn set_context(&mut self, ctx: QA) {
        self.ctx = Some(ctx)
    }

    #[inline]
    pub fn context(&self) -> Option<&QA> {
        self.ctx.as_ref()
    }

    /// 挂载分析器，`id` 是步骤编号。
    pub fn set_profiler(&mut self, profiler: Arc<dyn Profiler>, id: usize) {
        self.profiler = Some((profiler, id))
    }

    /// 独立测试内核时不向分析器报告。默认开启。
    #[inline]
    pub fn set_is_kernel_test(&mut self, is_kernel_test: bool) {
        self.is_kernel_test = is_kernel_test
    }

    /// 是否已经完成首次准备。
    #[inline]
    pub fn is_primed(&self) -> bool {
        !self.is_first_epoch
    }

    #[inline]
    pub fn place(&self) -> Place {
        self.kernel.place()
    }

    #[inline]
    pub fn target(&self) -> TargetType {
        self.place().target()
    }

    #[inline]
    pub fn precision(&self) -> PrecisionType {
        self.place().precision()
    }

    #[inline]
    pub fn layout(&self) -> DataLayoutType {
        self.place().layout()
    }

    #[inline]
    pub fn type_infer_handler(&self) -> Option<TypeInferHandler> {
        self.kernel.type_infer_handler()
    }

    #[inline]
    pub fn profile_info(&self) -> OpCharacter {
        self.kernel.profile_info()
    }

    /// 可读的名字，形如 `pool2d:host/float/NCHW`。
    pub fn name(&self) -> String {
        format!("{}:{}", self.op_type, self.place())
    }

    /// `op/alias`。
    pub fn key_with_alias(&self) -> String {
        format!("{}/{}", self.op_type, self.alias)
    }

    pub fn identity(&self) -> KernelIdentity {
        KernelIdentity::new(&self.op_type, &self.alias, self.place())
    }

    #[inline]
    pub fn serialized_identity(&self) -> String {
        self.identity().to_string()
    }

    /// 执行一个图步骤。
    ///
    /// 首次调用时准备内核，每次调用时检查是否需要重新准备，然后重置 `arena` 并执行计算。
    /// 挂载了分析器时只对计算本身计时。
    pub fn launch(&mut self, arena: &mut Arena<QA>) -> Result<(), LaunchError> {
        let Some(param) = &self.param else {
            contract_violation(&self.name(), format_args!("parameters not bound"))
        };
        let Some(ctx) = &self.ctx else {
            contract_violation(&self.name(), format_args!("context not bound"))
        };

        if self.is_first_epoch {
            self.kernel.prepare_for_run(param, ctx)?;
            self.is_first_epoch = false;
            debug!("{}:{} primed", self.op_type, self.kernel.place());
        }
        self.kernel.reinit_when_needed(param, ctx)?;

        arena.reset();
        trace!("launch {}/{}", self.op_type, self.alias);

        let profiler = self
            .profiler
            .as_ref()
            .filter(|_| !self.is_kernel_test);
        if let Some((profiler, id)) = profiler {
            profiler.stop_timing(TimingKind::Create, *id);
            profiler.start_timing(TimingKind::Dispatch, *id);
        }
        let ans = self.kernel.run(param, ctx, arena);
        if let Some((profiler, id)) = profiler {
            profiler.set_op_character(*id, self.kernel.profile_info());
            profiler.stop_timing(TimingKind::Dispatch, *id);
        }
        ans
    }
}

/// 内核的身份：算子类型、别名和执行位置。
///
/// 序列化形式为 `op/alias/<target>/<precision>/<layout>`，执行位置以整数编码。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct KernelIdentity {
    pub op_type: String,
    pub alias: String,
    pub place: Place,
}

impl KernelIdentity {
    /// 算子类型和别名必须非空且不含 `/`。
    pub fn new(op_type: &str, alias: &str, place: Place) -> Self {
        for (field, text) in [("op_type", op_type), ("alias", alias)] {
            if text.is_empty() || text.contains('/') {
                contract_violation(
                    "KernelIdentity",
                    format_args!("invalid {field} {text:?}"),
                )
            }
        }
        Self {
            op_type: op_type.into(),
            alias: alias.into(),
            place,
        }
    }
}

impl fmt::Display for KernelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.op_type,
            self.alias,
            self.place.target().code(),
            self.place.precision().code(),
            self.place.layout().code(),
        )
    }
}

/// 无法解析的身份字符串。
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum IdentityError {
    FieldCount(usize),
    EmptyField(&'static str),
    UnknownCode { field: &'static str, text: String },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FieldCount(n) => write!(f, "{n} fields in kernel identity, 5 expected"),
            Self::EmptyField(field) => write!(f, "{field} of kernel identity is empty"),
            Self::UnknownCode { field, text } => write!(f, "unknown {field} code {text:?}"),
        }
    }
}

impl Error for IdentityError {}

impl FromStr for KernelIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split('/').collect::<Vec<_>>();
        let &[op_type, alias, target, precision, layout] = &*fields else {
            return Err(IdentityError::FieldCount(fields.len()));
        };
        if op_type.is_empty() {
            return Err(IdentityError::EmptyField("op_type"));
        }
        if alias.is_empty() {
            return Err(IdentityError::EmptyField("alias"));
        }

        fn decode<T>(
            field: &'static str,
            text: &str,
            f: impl FnOnce(u8) -> Option<T>,
        ) -> Result<T, IdentityError> {
            text.parse().ok().and_then(f).ok_or_else(|| IdentityError::UnknownCode {
                field,
                text: text.into(),
            })
        }

        let place = Place::new(
            decode("target", target, TargetType::from_code)?,
            decode("precision", precision, PrecisionType::from_code)?,
            decode("layout", layout, DataLayoutType::from_code)?,
        );
        Ok(Self {
            op_type: op_type.into(),
            alias: alias.into(),
            place,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{common_cpu::ThisThread, roll, TensorLayout};
    use digit_layout::types as ty;
    use std::sync::Mutex;

    const HOST_FLOAT: Place = Place::new(
        TargetType::Host,
        PrecisionType::Float,
        DataLayoutType::NCHW,
    );

    #[derive(Default, Clone)]
    struct Counter {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Counter {
        fn push(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call)
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl Profiler for Counter {
        fn start_timing(&self, kind: TimingKind, _id: usize) {
            self.push(match kind {
                TimingKind::Create => "start create",
                TimingKind::Dispatch => "start dispatch",
            })
        }

        fn stop_timing(&self, kind: TimingKind, _id: usize) {
            self.push(match kind {
                TimingKind::Create => "stop create",
                TimingKind::Dispatch => "stop dispatch",
            })
        }

        fn set_op_character(&self, _id: usize, character: OpCharacter) {
            assert_eq!(character.kernel_func_name, "mock");
            self.push("character")
        }
    }

    struct Mock(Counter);

    impl Kernel<ThisThread> for Mock {
        fn place(&self) -> Place {
            HOST_FLOAT
        }

        fn prepare_for_run(
            &mut self,
            _param: &ParamBlock<crate::common_cpu::Cpu>,
            _ctx: &ThisThread,
        ) -> Result<(), SchemeError> {
            self.0.push("prepare");
            Ok(())
        }

        fn reinit_when_needed(
            &mut self,
            _param: &ParamBlock<crate::common_cpu::Cpu>,
            _ctx: &ThisThread,
        ) -> Result<(), SchemeError> {
            self.0.push("reinit");
            Ok(())
        }

        fn run(
            &mut self,
            _param: &ParamBlock<crate::common_cpu::Cpu>,
            _ctx: &ThisThread,
            arena: &Arena<ThisThread>,
        ) -> Result<(), LaunchError> {
            assert_eq!(arena.used(), 0);
            let _ = arena.take(100);
            self.0.push("run");
            Ok(())
        }

        fn profile_info(&self) -> OpCharacter {
            OpCharacter::named("mock")
        }
    }

    struct Unimplemented;

    impl Kernel<ThisThread> for Unimplemented {
        fn place(&self) -> Place {
            HOST_FLOAT
        }
    }

    fn null_param() -> roll::Args<crate::common_cpu::Cpu> {
        roll::Args::new_null(TensorLayout::new_contiguous(ty::F32, &[4]), vec![0], vec![1])
    }

    fn bound(kernel: Box<dyn Kernel<ThisThread>>) -> KernelBase<ThisThread> {
        let mut kernel = KernelBase::new(kernel);
        kernel.set_op_type("mock");
        kernel.set_alias("def");
        kernel.set_param(null_param());
        kernel.set_context(ThisThread);
        kernel
    }

    #[test]
    fn test_lifecycle() {
        let counter = Counter::default();
        let mut kernel = bound(Box::new(Mock(counter.clone())));
        let mut arena = Arena::new(ThisThread);

        assert!(!kernel.is_primed());
        kernel.launch(&mut arena).unwrap();
        assert!(kernel.is_primed());
        assert_eq!(counter.take(), ["prepare", "reinit", "run"]);

        // 第二次执行前 arena 被重置
        assert!(arena.used() > 0);
        kernel.launch(&mut arena).unwrap();
        kernel.launch(&mut arena).unwrap();
        assert_eq!(counter.take(), ["reinit", "run", "reinit", "run"]);

        assert_eq!(kernel.name(), "mock:host/float/NCHW");
        assert_eq!(kernel.key_with_alias(), "mock/def");
        assert_eq!(kernel.serialized_identity(), "mock/def/1/1/1");
        assert_eq!(kernel.profile_info().kernel_func_name, "mock");
        assert!(kernel.type_infer_handler().is_none());
    }

    #[test]
    fn test_profiling_wraps_run_only() {
        let counter = Counter::default();
        let profiler = Counter::default();
        let mut kernel = bound(Box::new(Mock(counter.clone())));
        kernel.set_profiler(Arc::new(profiler.clone()), 7);
        let mut arena = Arena::new(ThisThread);

        // 独立测试模式下不报告
        kernel.launch(&mut arena).unwrap();
        assert!(profiler.take().is_empty());

        kernel.set_is_kernel_test(false);
        kernel.launch(&mut arena).unwrap();
        assert_eq!(
            profiler.take(),
            ["stop create", "start dispatch", "character", "stop dispatch"]
        );
        assert_eq!(counter.take(), ["prepare", "reinit", "run", "reinit", "run"]);
    }

    #[test]
    #[should_panic(expected = "run() is not implemented")]
    fn test_unimplemented_run() {
        let mut kernel = bound(Box::new(Unimplemented));
        let _ = kernel.launch(&mut Arena::new(ThisThread));
    }

    #[test]
    #[should_panic(expected = "parameters not bound")]
    fn test_unbound_param() {
        let mut kernel = KernelBase::new(Box::new(Unimplemented));
        kernel.set_context(ThisThread);
        let _ = kernel.launch(&mut Arena::new(ThisThread));
    }

    #[test]
    #[should_panic(expected = "context not bound")]
    fn test_unbound_context() {
        let mut kernel = KernelBase::new(Box::new(Unimplemented));
        kernel.set_param(null_param());
        let _ = kernel.launch(&mut Arena::new(ThisThread));
    }

    #[test]
    #[should_panic(expected = "holds roll but pool2d requested")]
    fn test_param_type_mismatch() {
        let kernel = bound(Box::new(Unimplemented));
        let _ = kernel.param::<crate::pool::Args<crate::common_cpu::Cpu>>();
    }

    #[test]
    fn test_identity_round_trip() {
        for &target in TargetType::ALL {
            for &precision in PrecisionType::ALL {
                for &layout in DataLayoutType::ALL {
                    let place = Place::new(target, precision, layout);
                    let id = KernelIdentity::new("pool2d", "def", place);
                    let text = id.to_string();
                    assert_eq!(text.parse::<KernelIdentity>(), Ok(id));
                }
            }
        }
        let id = "roll/def/17/4/2".parse::<KernelIdentity>().unwrap();
        assert_eq!(id.place.target(), TargetType::Metal);
        assert_eq!(id.place.precision(), PrecisionType::Any);
        assert_eq!(id.place.layout(), DataLayoutType::Any);
    }

    #[test]
    fn test_identity_errors() {
        use IdentityError::*;
        let parse = |s: &str| s.parse::<KernelIdentity>().unwrap_err();
        assert_eq!(parse("pool2d/def/1/1"), FieldCount(4));
        assert_eq!(parse("pool2d/def/1/1/1/1"), FieldCount(6));
        assert_eq!(parse("/def/1/1/1"), EmptyField("op_type"));
        assert_eq!(parse("pool2d//1/1/1"), EmptyField("alias"));
        assert_eq!(
            parse("pool2d/def/7/1/1"),
            UnknownCode {
                field: "target",
                text: "7".into()
            }
        );
        assert_eq!(
            parse("pool2d/def/1/x/1"),
            UnknownCode {
                field: "precision",
                text: "x".into()
            }
        );
        assert_eq!(
            parse("pool2d/def/1/1/-1").to_string(),
            "unknown layout code \"-1\""
        );
    }

    #[test]
    #[should_panic(expected = "invalid alias")]
    fn test_identity_with_slash() {
        let _ = KernelIdentity::new("pool2d", "a/b", HOST_FLOAT);
    }
}
