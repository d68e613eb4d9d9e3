//! 测试用的脚本化控制器：记录收到的命令，可注入外部状态推送和故障

use crate::core::{ControllerValue, PreviewError, Result};
use crate::player::controller::{ValueNotifier, VideoController};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Initialize,
    Play,
    Pause,
    SetLooping(bool),
    SetVolume(f32),
    SeekTo(Duration),
    Dispose,
}

#[derive(Default)]
pub struct MockState {
    pub commands: Vec<Command>,
    pub value: ControllerValue,
    /// pause 被执行后仍然报告正在播放
    pub ignore_pause: bool,
    pub fail_initialize: bool,
    pub fail_pause: bool,
    pub fail_dispose: bool,
    pub disposed: bool,
    notifier: ValueNotifier,
}

/// 测试代码持有的句柄，与被会话持有的控制器共享状态
#[derive(Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controller(&self) -> MockController {
        MockController(self.clone())
    }

    pub fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.0.lock());
    }

    pub fn commands(&self) -> Vec<Command> {
        self.0.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.0.lock().commands.clear();
    }

    pub fn value(&self) -> ControllerValue {
        self.0.lock().value
    }

    pub fn listener_count(&self) -> usize {
        self.0.lock().notifier.listener_count()
    }

    /// 模拟控制器自发的状态变化
    pub fn emit(&self, f: impl FnOnce(&mut ControllerValue)) {
        let mut state = self.0.lock();
        f(&mut state.value);
        let value = state.value;
        state.notifier.notify(value);
    }

    fn record(&self, command: Command, apply: impl FnOnce(&mut MockState) -> Result<()>) -> Result<()> {
        let mut state = self.0.lock();
        state.commands.push(command);
        if state.disposed {
            return Err(PreviewError::Disposed);
        }
        apply(&mut state)?;
        let value = state.value;
        state.notifier.notify(value);
        Ok(())
    }
}

pub struct MockController(MockHandle);

impl VideoController for MockController {
    fn initialize(&mut self) -> Result<ControllerValue> {
        self.0.record(Command::Initialize, |state| {
            if state.fail_initialize {
                return Err(PreviewError::Other("模拟初始化失败".to_string()));
            }
            state.value.initialized = true;
            state.value.duration = Duration::from_secs(10);
            Ok(())
        })?;
        Ok(self.0.value())
    }

    fn play(&mut self) -> Result<()> {
        self.0.record(Command::Play, |state| {
            state.value.is_playing = true;
            Ok(())
        })
    }

    fn pause(&mut self) -> Result<()> {
        self.0.record(Command::Pause, |state| {
            if state.fail_pause {
                return Err(PreviewError::Other("模拟暂停失败".to_string()));
            }
            if !state.ignore_pause {
                state.value.is_playing = false;
            }
            Ok(())
        })
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.0.record(Command::SetLooping(looping), |state| {
            state.value.is_looping = looping;
            Ok(())
        })
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.0.record(Command::SetVolume(volume), |state| {
            state.value.volume = volume;
            Ok(())
        })
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        self.0.record(Command::SeekTo(position), |state| {
            state.value.position = position;
            Ok(())
        })
    }

    fn value(&self) -> ControllerValue {
        self.0.value()
    }

    fn add_listener(&mut self) -> Receiver<ControllerValue> {
        self.0 .0.lock().notifier.subscribe()
    }

    fn dispose(&mut self) -> Result<()> {
        let mut state = self.0 .0.lock();
        state.commands.push(Command::Dispose);
        if state.fail_dispose {
            return Err(PreviewError::Other("模拟释放失败".to_string()));
        }
        state.disposed = true;
        state.value.is_playing = false;
        state.notifier.clear();
        Ok(())
    }
}
