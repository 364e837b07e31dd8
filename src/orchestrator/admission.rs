//! 并发准入闸门
//!
//! 固定数量的执行槽位，排队的任务按"重试优先、同类先到先得"的顺序取得槽位。
//! 取消时清空整个等待队列，已取得槽位的任务不受影响。
//!
//! 没有直接用 `tokio::sync::Semaphore`：它只按到达顺序唤醒，无法让重试插到队首，
//! 也没有办法一次撤回所有等待者而不关闭信号量本身。

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// 排队通道，`Retry` 排在 `Fresh` 前面
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lane {
    Retry,
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TicketKey {
    lane: Lane,
    seq: u64,
}

#[derive(Debug, Default)]
struct GateState {
    running: usize,
    next_seq: u64,
    waiting: BTreeSet<TicketKey>,
}

enum Admission {
    Admitted,
    Waiting,
    Withdrawn,
}

/// 准入闸门
#[derive(Debug)]
pub struct AdmissionGate {
    limit: usize,
    state: Mutex<GateState>,
    notify: Notify,
}

impl AdmissionGate {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            state: Mutex::new(GateState::default()),
            notify: Notify::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记排队，登记顺序即同一通道内的准入顺序
    pub fn enqueue(self: &Arc<Self>, lane: Lane) -> Ticket {
        let mut state = self.lock();
        let key = TicketKey {
            lane,
            seq: state.next_seq,
        };
        state.next_seq += 1;
        state.waiting.insert(key);

        Ticket {
            gate: Arc::clone(self),
            key,
        }
    }

    /// 撤回所有排队中的票据
    ///
    /// # 返回
    /// 撤回的数量
    pub fn withdraw_all(&self) -> usize {
        let withdrawn = {
            let mut state = self.lock();
            let count = state.waiting.len();
            state.waiting.clear();
            count
        };
        if withdrawn > 0 {
            self.notify.notify_waiters();
        }
        withdrawn
    }

    pub fn running(&self) -> usize {
        self.lock().running
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    fn try_admit(&self, key: TicketKey) -> Admission {
        {
            let mut state = self.lock();
            if !state.waiting.contains(&key) {
                return Admission::Withdrawn;
            }
            if state.running >= self.limit || state.waiting.first() != Some(&key) {
                return Admission::Waiting;
            }
            state.waiting.remove(&key);
            state.running += 1;
        }
        // 队首变了，下一位可能也能进入
        self.notify.notify_waiters();
        Admission::Admitted
    }

    fn release(&self) {
        {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    fn forget(&self, key: TicketKey) {
        let removed = self.lock().waiting.remove(&key);
        if removed {
            self.notify.notify_waiters();
        }
    }
}

/// 排队票据，丢弃即退出队列
#[derive(Debug)]
pub struct Ticket {
    gate: Arc<AdmissionGate>,
    key: TicketKey,
}

impl Ticket {
    pub fn lane(&self) -> Lane {
        self.key.lane
    }

    /// 等待槽位
    ///
    /// # 返回
    /// 票据被撤回时返回 `None`
    pub async fn admit(self) -> Option<SlotPermit> {
        loop {
            let notified = self.gate.notify.notified();
            tokio::pin!(notified);
            // 先登记再检查，避免丢失唤醒
            notified.as_mut().enable();

            match self.gate.try_admit(self.key) {
                Admission::Admitted => {
                    return Some(SlotPermit {
                        gate: Arc::clone(&self.gate),
                    })
                }
                Admission::Withdrawn => return None,
                Admission::Waiting => notified.await,
            }
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.gate.forget(self.key);
    }
}

/// 执行槽位，丢弃即归还
#[derive(Debug)]
pub struct SlotPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
