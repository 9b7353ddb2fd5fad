//! 内核执行的计时挂载点。

use log::info;
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt::Write,
    sync::Mutex,
    time::{Duration, Instant},
};

/// 计时的阶段。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TimingKind {
    /// 从内核创建到首次执行。
    Create,
    /// 一次计算。
    Dispatch,
}

impl TimingKind {
    #[inline]
    const fn index(self) -> usize {
        match self {
            Self::Create => 0,
            Self::Dispatch => 1,
        }
    }
}

/// 异步后端上代表一次发射的事件，外部分析器据此查询完成时间。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventHandle(pub usize);

/// 内核报告给分析器的实现信息。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OpCharacter {
    /// 可读的实现标签，例如选中的特化实现名字。
    pub kernel_func_name: Cow<'static, str>,
    pub event: Option<EventHandle>,
}

impl Default for OpCharacter {
    fn default() -> Self {
        Self {
            kernel_func_name: Cow::Borrowed("NotImpl"),
            event: None,
        }
    }
}

impl OpCharacter {
    #[inline]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kernel_func_name: name.into(),
            event: None,
        }
    }
}

/// 分析器。
///
/// `id` 是挂载时分配给内核的步骤编号。同一个分析器会被多个内核共享，因此方法只取共享借用。
pub trait Profiler: Send + Sync {
    fn start_timing(&self, kind: TimingKind, id: usize);
    fn stop_timing(&self, kind: TimingKind, id: usize);
    fn set_op_character(&self, id: usize, character: OpCharacter);
}

#[derive(Default)]
struct Record {
    character: Option<OpCharacter>,
    running: [Option<Instant>; 2],
    total: [Duration; 2],
    count: [usize; 2],
}

/// 在内存中累计每个步骤计时的分析器。
#[derive(Default)]
pub struct BasicProfiler {
    records: Mutex<HashMap<usize, Record>>,
}

impl BasicProfiler {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 某个步骤某个阶段完成计时的次数。
    pub fn count(&self, kind: TimingKind, id: usize) -> usize {
        let records = self.records.lock().unwrap();
        records.get(&id).map_or(0, |r| r.count[kind.index()])
    }

    /// 某个步骤某个阶段的累计耗时。
    pub fn total(&self, kind: TimingKind, id: usize) -> Duration {
        let records = self.records.lock().unwrap();
        records
            .get(&id)
            .map_or(Duration::ZERO, |r| r.total[kind.index()])
    }

    pub fn op_character(&self, id: usize) -> Option<OpCharacter> {
        let records = self.records.lock().unwrap();
        records.get(&id).and_then(|r| r.character.clone())
    }

    /// 按步骤编号汇总计时结果，同时输出到日志。
    pub fn summary(&self) -> String {
        let records = self.records.lock().unwrap();
        let mut ids = records.keys().copied().collect::<Vec<_>>();
        ids.sort_unstable();

        let mut ans = String::new();
        for id in ids {
            let r = &records[&id];
            let name = r
                .character
                .as_ref()
                .map_or("NotImpl", |c| &*c.kernel_func_name);
            let [_, n] = r.count;
            let avg = if n == 0 {
                Duration::ZERO
            } else {
                r.total[1] / n as u32
            };
            let _ = writeln!(
                ans,
                "#{id:<4} {name:<24} dispatch x{n:<6} avg {avg:?} create {:?}",
                r.total[0],
            );
        }
        info!("profile summary\n{ans}");
        ans
    }
}

impl Profiler for BasicProfiler {
    fn start_timing(&self, kind: TimingKind, id: usize) {
        let mut records = self.records.lock().unwrap();
        records.entry(id).or_default().running[kind.index()] = Some(Instant::now());
    }

    fn stop_timing(&self, kind: TimingKind, id: usize) {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        let r = records.entry(id).or_default();
        let i = kind.index();
        // 没有开始过的计时直接忽略
        if let Some(start) = r.running[i].take() {
            r.total[i] += now - start;
            r.count[i] += 1;
        }
    }

    fn set_op_character(&self, id: usize, character: OpCharacter) {
        let mut records = self.records.lock().unwrap();
        records.entry(id).or_default().character = Some(character);
    }
}
