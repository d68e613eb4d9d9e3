use crate::core::{ControllerValue, Result, VideoFrame};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Duration;

/// 播放控制器 - 一个可播放媒体资源及其可变状态
///
/// 所有命令都是同步调用，返回即表示命令已被控制器执行完毕；
/// 状态变化另外通过监听通道推送。调用方不能假设推送的状态
/// 与自己刚发出的命令一致。
pub trait VideoController {
    /// 打开媒体并准备播放，返回初始状态
    fn initialize(&mut self) -> Result<ControllerValue>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn set_looping(&mut self, looping: bool) -> Result<()>;

    /// 设置音量 (0.0 - 1.0)
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn seek_to(&mut self, position: Duration) -> Result<()>;

    /// 当前状态快照
    fn value(&self) -> ControllerValue;

    /// 订阅状态变化；丢弃接收端即取消订阅
    fn add_listener(&mut self) -> Receiver<ControllerValue>;

    /// 由 UI 循环定期调用，驱动控制器的周期性工作
    fn tick(&mut self) {}

    /// 当前应显示的视频帧
    fn current_frame(&self) -> Option<&VideoFrame> {
        None
    }

    /// 释放资源（可重复调用）
    fn dispose(&mut self) -> Result<()>;
}

/// 状态推送分发器
#[derive(Default)]
pub struct ValueNotifier {
    listeners: Vec<Sender<ControllerValue>>,
}

impl ValueNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<ControllerValue> {
        let (tx, rx) = unbounded();
        self.listeners.push(tx);
        rx
    }

    /// 推送给所有监听者，接收端已丢弃的监听者被移除
    pub fn notify(&mut self, value: ControllerValue) {
        self.listeners.retain(|tx| tx.send(value).is_ok());
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
