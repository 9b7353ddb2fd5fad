//! 序列化身份到内核构造函数的映射。

use crate::{
    kernel::{contract_violation, IdentityError},
    Kernel, KernelBase, KernelIdentity, Place, QueueAlloc,
};
use log::debug;
use std::collections::HashMap;

type Factory<QA> = Box<dyn Fn() -> Box<dyn Kernel<QA>>>;

/// 内核注册表。
///
/// 只负责按身份构造内核，选择哪个内核由外部决定。
pub struct KernelRegistry<QA: QueueAlloc> {
    factories: HashMap<String, (KernelIdentity, Factory<QA>)>,
}

impl<QA: QueueAlloc> Default for KernelRegistry<QA> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<QA: QueueAlloc> KernelRegistry<QA> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个内核变体。执行位置从构造出的实例上读取，同一身份不能注册两次。
    pub fn register(
        &mut self,
        op_type: &str,
        alias: &str,
        factory: impl Fn() -> Box<dyn Kernel<QA>> + 'static,
    ) {
        let place = factory().place();
        let identity = KernelIdentity::new(op_type, alias, place);
        let key = identity.to_string();
        if self.factories.contains_key(&key) {
            contract_violation("KernelRegistry", format_args!("{key} registered twice"))
        }
        debug!("register kernel {op_type}/{alias} at {place}");
        self.factories.insert(key, (identity, Box::new(factory)));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 构造一个新的内核实例，设置好算子类型和别名。
    pub fn create(&self, op_type: &str, alias: &str, place: Place) -> Option<KernelBase<QA>> {
        let key = KernelIdentity::new(op_type, alias, place).to_string();
        self.create_by_key(&key)
    }

    /// 按序列化身份构造内核实例。身份字符串格式错误时返回错误，未注册时返回 `None`。
    pub fn create_by_identity(&self, text: &str) -> Result<Option<KernelBase<QA>>, IdentityError> {
        let identity = text.parse::<KernelIdentity>()?;
        Ok(self.create_by_key(&identity.to_string()))
    }

    fn create_by_key(&self, key: &str) -> Option<KernelBase<QA>> {
        let (identity, factory) = self.factories.get(key)?;
        let mut kernel = KernelBase::new(factory());
        kernel.set_op_type(&*identity.op_type);
        kernel.set_alias(&*identity.alias);
        Some(kernel)
    }

    /// 一个算子的全部变体，按序列化身份排序。
    pub fn kernels_for(&self, op_type: &str) -> Vec<KernelIdentity> {
        let mut ans = self
            .factories
            .iter()
            .filter(|(_, (id, _))| id.op_type == op_type)
            .map(|(key, (id, _))| (key, id.clone()))
            .collect::<Vec<_>>();
        ans.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        ans.into_iter().map(|(_, id)| id).collect()
    }
}
