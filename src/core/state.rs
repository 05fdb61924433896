//! 信道接入状态机的状态及其合法转换。
//! States of the channel-access state machine and their legal transitions.
//!
//! Each state owns the tokens of the timers it scheduled, so leaving a state
//! is exactly the point where those timers are cancelled.
//!
//! 每个状态拥有其所调度定时器的令牌，因此离开状态正是取消这些定时器的时刻。

use crate::{
    packet::{BlockAckInfo, ControlFrame, MacAddress},
    timer::TimerToken,
};

/// What this station does when its SIFS turn-around ends.
/// 本站在SIFS转换结束时要做的事。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SifsAction {
    /// Send the data frame after a CTS.
    /// 在CTS之后发送数据帧。
    SendData,
    /// Start the burst after a CTS.
    /// 在CTS之后开始突发。
    SendAggregate,
    /// Send the Block-ACK request after the last subframe.
    /// 在最后一个子帧之后发送块确认请求。
    SendBlockAckRequest,
    /// Chain the next frame of the category inside its TXOP.
    /// 在TXOP内链接该类别的下一帧。
    ContinueTxop { category: usize },
    RespondAck { to: MacAddress },
    RespondCts { rts: ControlFrame },
    RespondBlockAck { to: MacAddress, info: BlockAckInfo },
}

/// The transmit-side state, together with the timers it owns.
///
/// 发送侧状态及其拥有的定时器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacState {
    /// Nothing to send.
    /// 无待发送内容。
    Idle,
    /// Waiting for the medium to become free.
    /// 等待介质变为空闲。
    Defer,
    /// AIFS running for each listed category.
    /// 为列出的每个类别运行AIFS。
    WaitAifs { aifs: Vec<(usize, TimerToken)> },
    /// Counting down backoff slots; AIFS may still run for some categories.
    /// 正在倒数退避时隙；部分类别可能仍在运行AIFS。
    Backoff {
        tick: TimerToken,
        aifs: Vec<(usize, TimerToken)>,
    },
    WaitCts { timeout: TimerToken },
    WaitAck { timeout: TimerToken, extended: bool },
    WaitBlockAck { timeout: TimerToken, extended: bool },
    /// Group-addressed frame on the air; no response expected.
    /// 组播帧正在发送；不期待响应。
    WaitMulticast { dwell: TimerToken },
    /// Subframes from `next` onwards have not been sent yet. `guard` fires if
    /// the transmitter never reports the end of the current subframe.
    ///
    /// 从 `next` 开始的子帧尚未发送。如果发射机从未报告当前子帧结束，`guard` 触发。
    SendAggregate { next: usize, guard: TimerToken },
    WaitSifs { timer: TimerToken, action: SifsAction },
}

/// The discriminant of a [`MacState`], for logging and transition checks.
/// [`MacState`] 的判别值，用于日志和转换检查。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    Defer,
    WaitAifs,
    Backoff,
    WaitCts,
    WaitAck,
    WaitBlockAck,
    WaitMulticast,
    SendAggregate,
    WaitSifs,
}

impl MacState {
    pub fn kind(&self) -> StateKind {
        match self {
            MacState::Idle => StateKind::Idle,
            MacState::Defer => StateKind::Defer,
            MacState::WaitAifs { .. } => StateKind::WaitAifs,
            MacState::Backoff { .. } => StateKind::Backoff,
            MacState::WaitCts { .. } => StateKind::WaitCts,
            MacState::WaitAck { .. } => StateKind::WaitAck,
            MacState::WaitBlockAck { .. } => StateKind::WaitBlockAck,
            MacState::WaitMulticast { .. } => StateKind::WaitMulticast,
            MacState::SendAggregate { .. } => StateKind::SendAggregate,
            MacState::WaitSifs { .. } => StateKind::WaitSifs,
        }
    }

    /// Every timer token held by this state.
    /// 该状态持有的所有定时器令牌。
    pub fn tokens(&self) -> Vec<TimerToken> {
        match self {
            MacState::Idle | MacState::Defer => Vec::new(),
            MacState::WaitAifs { aifs } => aifs.iter().map(|(_, t)| *t).collect(),
            MacState::Backoff { tick, aifs } => std::iter::once(*tick)
                .chain(aifs.iter().map(|(_, t)| *t))
                .collect(),
            MacState::WaitCts { timeout }
            | MacState::WaitAck { timeout, .. }
            | MacState::WaitBlockAck { timeout, .. } => vec![*timeout],
            MacState::WaitMulticast { dwell } => vec![*dwell],
            MacState::SendAggregate { guard, .. } => vec![*guard],
            MacState::WaitSifs { timer, .. } => vec![*timer],
        }
    }

    pub fn owns(&self, token: TimerToken) -> bool {
        self.tokens().contains(&token)
    }

    /// Categories whose AIFS timer is still running.
    /// AIFS定时器仍在运行的类别。
    pub fn running_aifs(&self) -> Vec<usize> {
        match self {
            MacState::WaitAifs { aifs } | MacState::Backoff { aifs, .. } => {
                aifs.iter().map(|(c, _)| *c).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// 状态验证器，负责所有状态转换的合法性检查
/// State validator for transitions of the channel-access state machine
pub struct StateValidator;

impl StateValidator {
    /// 验证状态转换是否合法
    /// Validate if state transition is legal
    pub fn is_valid_transition(current: StateKind, next: StateKind) -> bool {
        use StateKind::*;

        match (current, next) {
            // 任何空闲状态都可以在收到帧后转入SIFS应答
            // Any contention-side state may turn around to answer a frame
            (Idle | Defer | WaitAifs | Backoff, WaitSifs) => true,

            (Idle, Defer) => true,

            (Defer, WaitAifs) => true,
            (Defer, Idle) => true,

            // 竞争：AIFS 与退避
            // Contention: AIFS and backoff
            (WaitAifs, Defer | Idle | Backoff) => true,
            (Backoff, Defer | Idle) => true,

            // 赢得竞争后启动交换
            // Exchange start after won contention
            (WaitAifs | Backoff, WaitCts | WaitAck | WaitBlockAck | WaitMulticast | SendAggregate) => {
                true
            }
            // 等待状态的结果
            // Outcomes of the wait states
            (WaitCts, WaitSifs | Defer | Idle) => true,
            (WaitAck, WaitSifs | Defer | Idle | WaitAck) => true,
            (WaitBlockAck, Defer | Idle | WaitBlockAck) => true,
            (WaitMulticast, Defer | Idle) => true,
            (SendAggregate, SendAggregate | WaitSifs | Defer | Idle) => true,

            // SIFS 之后
            // After SIFS
            (WaitSifs, WaitAck | SendAggregate | WaitBlockAck | Defer | Idle) => true,

            _ => false,
        }
    }
}
