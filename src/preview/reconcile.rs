//! 用户意图与控制器上报状态的对账策略
//!
//! 每条状态推送只调用一次 [`Reconciler::observe`]，它最多给出一个纠正动作。
//! 连续纠正失败超过上限后升级为错误并停止纠正，避免与控制器无休止地拉锯。
//! 这里不发命令、不打日志，只做判断，便于测试。

use crate::core::ControllerValue;
use std::time::Duration;

/// 用户最近一次明确的播放/暂停请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackIntent {
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    pub volume_epsilon: f32,
    pub position_jump_threshold: Duration,
    pub max_corrections: u32,
}

/// 对控制器重新下发的纠正命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// 暂停意图下控制器仍在播放：暂停并静音
    ForcePause,
    /// 暂停意图下音量回升：重新静音
    Remute,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Correct(Correction),
    /// 连续纠正失败，放弃纠正（只返回一次）
    Escalate { attempts: u32 },
    /// 已升级，状态仍不一致，不再下发命令
    Hold,
    /// 状态一致，显示状态跟随控制器
    Mirror { playing: bool },
}

/// 相对上一条推送检测到的外部变化
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateChange {
    PlayState { playing: bool },
    Volume { from: f32, to: f32 },
    PositionJump { from: Duration, to: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub decision: Decision,
    pub changes: Vec<StateChange>,
}

pub struct Reconciler {
    policy: ReconcilePolicy,
    intent: PlaybackIntent,
    last: Option<ControllerValue>,
    attempts: u32,
    escalated: bool,
}

impl Reconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self {
            policy,
            intent: PlaybackIntent::Paused,
            last: None,
            attempts: 0,
            escalated: false,
        }
    }

    pub fn intent(&self) -> PlaybackIntent {
        self.intent
    }

    /// 用户改变意图后重新开始计数
    pub fn set_intent(&mut self, intent: PlaybackIntent) {
        self.intent = intent;
        self.attempts = 0;
        self.escalated = false;
    }

    #[cfg(test)]
    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    pub fn observe(&mut self, value: &ControllerValue) -> Reconciliation {
        let changes = self.detect_changes(value);
        self.last = Some(*value);

        let drift = match self.intent {
            PlaybackIntent::Paused if value.is_playing => Some(Correction::ForcePause),
            PlaybackIntent::Paused if value.volume > self.policy.volume_epsilon => Some(Correction::Remute),
            _ => None,
        };

        let decision = match drift {
            None => {
                self.attempts = 0;
                self.escalated = false;
                Decision::Mirror {
                    playing: value.is_playing,
                }
            }
            Some(_) if self.escalated => Decision::Hold,
            Some(correction) => {
                self.attempts += 1;
                if self.attempts > self.policy.max_corrections {
                    self.escalated = true;
                    Decision::Escalate {
                        attempts: self.attempts - 1,
                    }
                } else {
                    Decision::Correct(correction)
                }
            }
        };

        Reconciliation { decision, changes }
    }

    fn detect_changes(&self, value: &ControllerValue) -> Vec<StateChange> {
        let Some(last) = self.last else {
            return Vec::new();
        };

        let mut changes = Vec::new();
        if last.is_playing != value.is_playing {
            changes.push(StateChange::PlayState {
                playing: value.is_playing,
            });
        }
        if (last.volume - value.volume).abs() > f32::EPSILON {
            changes.push(StateChange::Volume {
                from: last.volume,
                to: value.volume,
            });
        }
        let jump = if value.position > last.position {
            value.position - last.position
        } else {
            last.position - value.position
        };
        if jump > self.policy.position_jump_threshold {
            changes.push(StateChange::PositionJump {
                from: last.position,
                to: value.position,
            });
        }
        changes
    }
}
