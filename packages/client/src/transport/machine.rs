//! Socket lifecycle state machine.
//!
//! ```text
//! closed --Connect--> connecting --Opened--> open --Closed(1000)--> closed
//! connecting --Failed--> closed (+ maybe reconnect)
//! open --Closed(!=1000)--> closed (+ maybe reconnect)
//! any --Disconnect--> closing --CloseCompleted--> closed
//! ```
//!
//! Every attempt gets a new epoch. Events and reconnect timers carry the
//! epoch they were issued for, and anything from an older epoch is ignored.

use std::time::Duration;

/// Normal closure close code
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Input to [`ConnectionMachine::transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Caller asked to connect
    Connect,
    /// Handshake for `epoch` completed
    Opened { epoch: u64 },
    /// Attempt `epoch` failed before opening (error or timeout)
    Failed { epoch: u64 },
    /// Socket of `epoch` closed; `None` when no close frame was received
    Closed { epoch: u64, code: Option<u16> },
    /// Reconnect timer scheduled during `epoch` fired
    RetryDue { epoch: u64 },
    /// Caller asked to disconnect
    Disconnect,
    /// Close frame for a caller-initiated disconnect has been flushed
    CloseCompleted,
    /// Forget previous attempts, e.g. before a manual reconnect
    Reset,
}

/// What the caller must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do
    None,
    /// Event belonged to an older epoch and was dropped
    Stale,
    /// Open a socket for `epoch`
    Dial { epoch: u64 },
    /// Socket is open: send the auth frame and notify listeners
    Authenticate,
    /// Socket closed normally; no reconnect
    Settled,
    /// Schedule `RetryDue { epoch }` after `delay`
    ScheduleReconnect {
        attempt: u32,
        delay: Duration,
        epoch: u64,
    },
    /// Automatic attempts exhausted
    GiveUp { attempts: u32 },
    /// Send a normal close frame
    CloseSocket,
}

#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    epoch: u64,
    attempts: u32,
    base_delay: Duration,
    max_attempts: u32,
}

impl ConnectionMachine {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Closed,
            epoch: 0,
            attempts: 0,
            base_delay,
            max_attempts,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 自動再接続を行った回数
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `base × 2^(attempt-1)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub fn transition(&mut self, event: LifecycleEvent) -> Action {
        match event {
            LifecycleEvent::Connect => match self.state {
                ConnectionState::Closed => self.dial(),
                // 接続試行は常に 1 つだけ
                ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing => {
                    Action::None
                }
            },
            LifecycleEvent::RetryDue { epoch } => {
                if epoch != self.epoch || self.state != ConnectionState::Closed {
                    return Action::Stale;
                }
                self.dial()
            }
            LifecycleEvent::Opened { epoch } => {
                if epoch != self.epoch || self.state != ConnectionState::Connecting {
                    return Action::Stale;
                }
                self.state = ConnectionState::Open;
                self.attempts = 0;
                Action::Authenticate
            }
            LifecycleEvent::Failed { epoch } => {
                if epoch != self.epoch || self.state != ConnectionState::Connecting {
                    return Action::Stale;
                }
                self.state = ConnectionState::Closed;
                self.next_retry()
            }
            LifecycleEvent::Closed { epoch, code } => {
                if epoch != self.epoch
                    || !matches!(
                        self.state,
                        ConnectionState::Open | ConnectionState::Connecting
                    )
                {
                    return Action::Stale;
                }
                self.state = ConnectionState::Closed;
                if code == Some(NORMAL_CLOSURE) {
                    Action::Settled
                } else {
                    self.next_retry()
                }
            }
            LifecycleEvent::Disconnect => {
                // 進行中の接続と予約済みの再接続を無効にする
                self.epoch += 1;
                match self.state {
                    ConnectionState::Open => {
                        self.state = ConnectionState::Closing;
                        Action::CloseSocket
                    }
                    ConnectionState::Connecting | ConnectionState::Closing => {
                        self.state = ConnectionState::Closing;
                        Action::None
                    }
                    ConnectionState::Closed => Action::None,
                }
            }
            LifecycleEvent::CloseCompleted => {
                if self.state == ConnectionState::Closing {
                    self.state = ConnectionState::Closed;
                }
                Action::None
            }
            LifecycleEvent::Reset => {
                self.attempts = 0;
                if self.state == ConnectionState::Closed {
                    self.epoch += 1;
                }
                Action::None
            }
        }
    }

    fn dial(&mut self) -> Action {
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        Action::Dial { epoch: self.epoch }
    }

    fn next_retry(&mut self) -> Action {
        if self.attempts >= self.max_attempts {
            return Action::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        Action::ScheduleReconnect {
            attempt: self.attempts,
            delay: self.backoff_delay(self.attempts),
            epoch: self.epoch,
        }
    }
}
