//! 单个预览视图的播放会话
//!
//! 会话在 UI 线程上运行：状态推送一条一条处理，用户点击在两次处理之间执行，
//! 二者不会交错。每个控制器命令都是同步调用，返回即完成，因此命令序列
//! 之间不需要固定延时。

use crate::core::{ControllerValue, PreviewConfig, Result};
use crate::player::{backend, VideoController};
use crate::preview::reconcile::{
    Correction, Decision, PlaybackIntent, ReconcilePolicy, Reconciler, StateChange,
};
use crate::preview::temp_media::TempMedia;
use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// 依次执行清理步骤，单步失败只记录日志
fn best_effort(step: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("⚠️  {} 失败（继续清理）: {}", step, e);
    }
}

pub struct PreviewSession<C: VideoController> {
    config: PreviewConfig,
    controller: Option<C>,
    listener: Option<Receiver<ControllerValue>>,
    media: Option<TempMedia>,
    reconciler: Reconciler,
    initialized: bool,
    displayed_playing: bool,
    /// 最近一次用户暂停前的音量
    saved_volume: f32,
    error: Option<String>,
    cleanup_tasks: Vec<thread::JoinHandle<()>>,
}

impl<C: VideoController> PreviewSession<C> {
    pub fn new(config: PreviewConfig) -> Self {
        let reconciler = Reconciler::new(ReconcilePolicy {
            volume_epsilon: config.volume_epsilon,
            position_jump_threshold: config.position_jump_threshold(),
            max_corrections: config.max_corrections,
        });
        Self {
            config,
            controller: None,
            listener: None,
            media: None,
            reconciler,
            initialized: false,
            displayed_playing: false,
            saved_volume: 1.0,
            error: None,
            cleanup_tasks: Vec::new(),
        }
    }

    /// 写入临时文件、创建并初始化控制器，然后以非循环模式开始播放
    ///
    /// 失败不会向外传播：记录日志、执行清理，错误信息留给视图显示。
    pub fn initialize<F>(&mut self, bytes: &[u8], make_controller: F)
    where
        F: FnOnce(&Path) -> Result<C>,
    {
        if self.initialized || self.controller.is_some() {
            debug!("会话已初始化，忽略重复初始化");
            return;
        }

        if !backend::is_available() {
            warn!("⚠️  播放后端未注册，继续尝试初始化");
        }

        if let Err(e) = self.try_initialize(bytes, make_controller) {
            error!("❌ 视频预览初始化失败: {}", e);
            self.dispose();
            self.error = Some(format!("无法加载视频: {}", e));
        }
    }

    fn try_initialize<F>(&mut self, bytes: &[u8], make_controller: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<C>,
    {
        let media = TempMedia::write(bytes, &self.config)?;
        let controller = make_controller(media.path());
        self.media = Some(media);

        let controller = self.controller.insert(controller?);
        let value = controller.initialize()?;
        info!(
            "🎬 控制器就绪: 时长 {:.1}s, 宽高比 {:.3}",
            value.duration.as_secs_f64(),
            value.aspect_ratio
        );

        self.listener = Some(controller.add_listener());
        controller.set_looping(false)?;
        controller.play()?;

        self.saved_volume = value.volume;
        self.reconciler.set_intent(PlaybackIntent::Playing);
        self.initialized = true;
        self.settle();
        Ok(())
    }

    /// 驱动控制器并处理所有待处理的状态推送
    pub fn pump(&mut self) {
        if let Some(controller) = &mut self.controller {
            controller.tick();
        }
        self.process_pending();
    }

    /// 先取出已排队的推送再逐条处理，纠正命令产生的回显不会和它们混在一起
    fn process_pending(&mut self) {
        let pending: Vec<ControllerValue> = self
            .listener
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for value in pending {
            self.handle_value(value);
        }
    }

    /// 对一条状态推送执行对账，最多下发一次纠正
    pub fn handle_value(&mut self, value: ControllerValue) {
        let outcome = self.reconciler.observe(&value);
        for change in &outcome.changes {
            match change {
                StateChange::PlayState { playing } => {
                    info!("📡 外部播放状态变化: {}", if *playing { "播放" } else { "暂停" })
                }
                StateChange::Volume { from, to } => debug!("📡 外部音量变化: {:.2} → {:.2}", from, to),
                StateChange::PositionJump { from, to } => info!(
                    "📡 播放位置跳变: {:.2}s → {:.2}s",
                    from.as_secs_f64(),
                    to.as_secs_f64()
                ),
            }
        }

        match outcome.decision {
            Decision::Mirror { playing } => self.displayed_playing = playing,
            Decision::Correct(Correction::ForcePause) => {
                warn!("⚠️  暂停状态下控制器报告正在播放，重新暂停并静音");
                self.displayed_playing = false;
                self.run_commands(|c| {
                    best_effort("纠正暂停", c.pause());
                    best_effort("纠正静音", c.set_volume(0.0));
                });
            }
            Decision::Correct(Correction::Remute) => {
                warn!("⚠️  暂停状态下音量回升到 {:.2}，重新静音", value.volume);
                self.run_commands(|c| best_effort("纠正静音", c.set_volume(0.0)));
            }
            Decision::Escalate { attempts } => {
                error!("❌ 连续 {} 次纠正后控制器仍未暂停，停止纠正", attempts);
                self.displayed_playing = value.is_playing;
                self.error = Some(format!("播放器无法保持暂停（已纠正 {} 次）", attempts));
            }
            Decision::Hold => self.displayed_playing = value.is_playing,
        }
    }

    /// 点击切换播放/暂停
    pub fn toggle(&mut self) {
        if !self.initialized {
            return;
        }
        // 以点击时显示的状态为准；之前排队的推送仍按旧意图处理
        let pause = self.displayed_playing;
        self.process_pending();
        if pause {
            self.pause_by_user();
        } else {
            self.resume_by_user();
        }
    }

    fn pause_by_user(&mut self) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        info!("⏸️  用户暂停");
        // 已处于暂停意图时音量是被静音后的值，不能覆盖
        if self.reconciler.intent() == PlaybackIntent::Playing {
            self.saved_volume = controller.value().volume;
        }
        self.reconciler.set_intent(PlaybackIntent::Paused);
        self.error = None;

        best_effort("静音", controller.set_volume(0.0));
        best_effort("关闭循环", controller.set_looping(false));
        best_effort("暂停", controller.pause());
        if controller.value().is_playing {
            warn!("⚠️  暂停后控制器仍在播放，再次暂停");
            best_effort("再次暂停", controller.pause());
        }

        self.displayed_playing = false;
        self.settle();
    }

    fn resume_by_user(&mut self) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        info!("▶️  用户继续播放");
        self.reconciler.set_intent(PlaybackIntent::Playing);
        self.error = None;

        best_effort("恢复音量", controller.set_volume(self.saved_volume));
        best_effort("开启循环", controller.set_looping(true));
        best_effort("播放", controller.play());

        self.displayed_playing = true;
        self.settle();
    }

    /// 进度条拖动结束
    pub fn seek(&mut self, position: Duration) {
        if let Some(controller) = &mut self.controller {
            if let Err(e) = controller.seek_to(position) {
                error!("Seek 失败: {}", e);
            }
        }
    }

    /// 释放会话：解除监听、尽力停止、释放控制器、延迟删除临时文件
    ///
    /// 可重复调用，不会 panic。
    pub fn dispose(&mut self) {
        self.listener = None;

        if let Some(mut controller) = self.controller.take() {
            info!("🧹 释放视频预览");
            best_effort("静音", controller.set_volume(0.0));
            best_effort("关闭循环", controller.set_looping(false));
            best_effort("暂停", controller.pause());
            best_effort("回到开头", controller.seek_to(Duration::ZERO));
            if let Err(e) = controller.dispose() {
                error!("❌ 释放控制器失败: {}", e);
            }
        }

        if let Some(media) = self.media.take() {
            self.cleanup_tasks
                .push(media.remove_after(self.config.temp_file_grace()));
        }

        self.initialized = false;
        self.displayed_playing = false;
    }

    /// 等待后台清理任务完成（退出进程前调用）
    pub fn wait_for_cleanup(&mut self) {
        for task in self.cleanup_tasks.drain(..) {
            if task.join().is_err() {
                warn!("⚠️  临时文件清理线程异常退出");
            }
        }
    }

    /// 执行一组纠正命令并丢弃它们产生的回显推送
    fn run_commands(&mut self, commands: impl FnOnce(&mut C)) {
        if let Some(controller) = &mut self.controller {
            commands(controller);
        }
        self.discard_echoes();
    }

    /// 命令序列结束后，用控制器的当前状态代替序列中途的回显
    fn settle(&mut self) {
        self.discard_echoes();
        if let Some(value) = self.controller.as_ref().map(|c| c.value()) {
            self.handle_value(value);
        }
    }

    fn discard_echoes(&mut self) {
        if let Some(rx) = &self.listener {
            let discarded = rx.try_iter().count();
            if discarded > 0 {
                debug!("丢弃 {} 条命令回显", discarded);
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_playing(&self) -> bool {
        self.displayed_playing
    }

    #[cfg(test)]
    pub fn intent(&self) -> PlaybackIntent {
        self.reconciler.intent()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn controller(&self) -> Option<&C> {
        self.controller.as_ref()
    }

    pub fn value(&self) -> Option<ControllerValue> {
        self.controller.as_ref().map(|c| c.value())
    }

    #[cfg(test)]
    pub fn has_temp_media(&self) -> bool {
        self.media.is_some()
    }
}

impl<C: VideoController> Drop for PreviewSession<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::mock_controller::{Command, MockController, MockHandle};

    fn config_in(dir: &Path) -> PreviewConfig {
        PreviewConfig {
            temp_dir: Some(dir.to_path_buf()),
            temp_file_grace_ms: 20,
            max_corrections: 3,
            ..Default::default()
        }
    }

    fn started(dir: &Path) -> (PreviewSession<MockController>, MockHandle) {
        let handle = MockHandle::new();
        let mut session = PreviewSession::new(config_in(dir));
        let controller = handle.controller();
        session.initialize(b"fake video", move |_| Ok(controller));
        assert!(session.is_initialized());
        handle.clear_commands();
        (session, handle)
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_initialize_starts_non_looping_playback() {
        let dir = tempfile::tempdir().unwrap();
        let handle = MockHandle::new();
        let mut session = PreviewSession::new(config_in(dir.path()));
        let controller = handle.controller();
        session.initialize(b"fake video", move |path| {
            assert_eq!(std::fs::read(path).unwrap(), b"fake video");
            Ok(controller)
        });

        assert_eq!(
            handle.commands(),
            vec![Command::Initialize, Command::SetLooping(false), Command::Play]
        );
        assert!(session.is_playing());
        assert_eq!(session.intent(), PlaybackIntent::Playing);
        assert_eq!(handle.listener_count(), 1);
        assert!(session.error_message().is_none());
    }

    #[test]
    fn test_single_tap_pauses_mutes_and_disables_looping() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.emit(|v| {
            v.is_playing = true;
            v.volume = 1.0;
        });
        session.pump();

        session.toggle();

        assert_eq!(
            handle.commands(),
            vec![Command::SetVolume(0.0), Command::SetLooping(false), Command::Pause]
        );
        let value = handle.value();
        assert!(!value.is_playing);
        assert_eq!(value.volume, 0.0);
        assert!(!value.is_looping);
        assert!(!session.is_playing());
    }

    #[test]
    fn test_spurious_playing_notification_gets_one_correction_pair() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        session.toggle();
        handle.clear_commands();

        handle.emit(|v| v.is_playing = true);
        session.pump();

        assert_eq!(handle.commands(), vec![Command::Pause, Command::SetVolume(0.0)]);
        assert!(!session.is_playing());
    }

    #[test]
    fn test_volume_drift_while_paused_is_remuted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        session.toggle();
        handle.clear_commands();

        handle.emit(|v| v.volume = 0.6);
        session.pump();

        assert_eq!(handle.commands(), vec![Command::SetVolume(0.0)]);
        assert_eq!(handle.value().volume, 0.0);
    }

    #[test]
    fn test_pause_then_resume_restores_volume() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.emit(|v| v.volume = 0.37);
        session.pump();

        session.toggle();
        assert_eq!(handle.value().volume, 0.0);
        session.toggle();

        assert!((handle.value().volume - 0.37).abs() < 1e-6);
        assert!(handle.value().is_looping);
        assert!(handle.value().is_playing);
        assert!(session.is_playing());
    }

    #[test]
    fn test_stubborn_controller_is_paused_twice_on_tap() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.configure(|s| s.ignore_pause = true);

        session.toggle();

        let pauses = handle
            .commands()
            .iter()
            .filter(|c| **c == Command::Pause)
            .count();
        // 两次用户暂停加一次纠正
        assert_eq!(pauses, 3);
        assert!(!session.is_playing());
    }

    #[test]
    fn test_repeated_failed_corrections_escalate() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.configure(|s| s.ignore_pause = true);
        session.toggle();

        for _ in 0..2 {
            handle.emit(|v| v.is_playing = true);
            session.pump();
            assert!(session.error_message().is_none());
        }

        handle.emit(|v| v.is_playing = true);
        session.pump();
        assert!(session.error_message().is_some());

        handle.clear_commands();
        handle.emit(|v| v.is_playing = true);
        session.pump();
        assert!(handle.commands().is_empty());
    }

    #[test]
    fn test_toggle_clears_escalation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.configure(|s| s.ignore_pause = true);
        session.toggle();
        for _ in 0..3 {
            handle.emit(|v| v.is_playing = true);
            session.pump();
        }
        assert!(session.error_message().is_some());

        handle.configure(|s| s.ignore_pause = false);
        session.toggle();
        assert!(session.error_message().is_none());
        assert_eq!(session.intent(), PlaybackIntent::Paused);
        assert!(!handle.value().is_playing);
    }

    #[test]
    fn test_each_queued_playing_notification_gets_its_own_correction() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        session.toggle();
        handle.configure(|s| s.ignore_pause = true);
        handle.clear_commands();

        for _ in 0..3 {
            handle.emit(|v| v.is_playing = true);
        }
        session.pump();

        assert_eq!(
            handle.commands(),
            vec![
                Command::Pause,
                Command::SetVolume(0.0),
                Command::Pause,
                Command::SetVolume(0.0),
                Command::Pause,
                Command::SetVolume(0.0),
            ]
        );
        assert!(session.error_message().is_none());

        // 第四次仍在播放，超过上限
        handle.emit(|v| v.is_playing = true);
        session.pump();
        assert!(session.error_message().is_some());
    }

    #[test]
    fn test_notifications_queued_before_tap_are_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        session.toggle();
        handle.clear_commands();

        handle.emit(|v| v.volume = 0.5);
        session.toggle();

        // 先按暂停意图重新静音，再恢复播放
        assert_eq!(handle.commands()[0], Command::SetVolume(0.0));
        assert!(handle.value().is_playing);
        assert!((handle.value().volume - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_survives_escalation_and_repeated_taps() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.emit(|v| v.volume = 0.8);
        session.pump();

        session.toggle();
        handle.configure(|s| s.ignore_pause = true);
        for _ in 0..4 {
            handle.emit(|v| v.is_playing = true);
            session.pump();
        }
        assert!(session.error_message().is_some());
        assert!(session.is_playing());

        session.toggle();
        assert!(!session.is_playing());
        handle.configure(|s| s.ignore_pause = false);
        session.toggle();

        assert!((handle.value().volume - 0.8).abs() < 1e-6);
        assert!(handle.value().is_playing);
    }

    #[test]
    fn test_dispose_stops_and_deletes_temp_file_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        assert_eq!(temp_files(dir.path()), 1);

        session.dispose();
        assert_eq!(
            handle.commands(),
            vec![
                Command::SetVolume(0.0),
                Command::SetLooping(false),
                Command::Pause,
                Command::SeekTo(Duration::ZERO),
                Command::Dispose,
            ]
        );
        assert!(!session.is_initialized());

        session.wait_for_cleanup();
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());

        session.dispose();
        handle.clear_commands();
        session.dispose();
        session.dispose();

        assert!(handle.commands().is_empty());
        session.wait_for_cleanup();
    }

    #[test]
    fn test_dispose_without_controller() {
        let dir = tempfile::tempdir().unwrap();
        let mut session: PreviewSession<MockController> = PreviewSession::new(config_in(dir.path()));
        session.dispose();
        session.dispose();
        session.pump();
        session.toggle();
        assert!(!session.is_playing());
    }

    #[test]
    fn test_failing_steps_do_not_block_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.configure(|s| {
            s.fail_pause = true;
            s.fail_dispose = true;
        });

        session.dispose();

        let commands = handle.commands();
        assert!(commands.contains(&Command::SeekTo(Duration::ZERO)));
        assert_eq!(commands.last(), Some(&Command::Dispose));
        session.wait_for_cleanup();
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn test_dispose_detaches_listener() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        handle.configure(|s| s.fail_dispose = true);

        session.dispose();
        handle.emit(|v| v.is_playing = true);

        assert_eq!(handle.listener_count(), 0);
        session.wait_for_cleanup();
    }

    #[test]
    fn test_file_write_failure_creates_no_controller() {
        let dir = tempfile::tempdir().unwrap();
        let handle = MockHandle::new();
        let mut session = PreviewSession::new(config_in(&dir.path().join("missing")));
        let mut factory_called = false;

        session.initialize(b"fake video", |_| {
            factory_called = true;
            Ok(handle.controller())
        });

        assert!(!factory_called);
        assert!(handle.commands().is_empty());
        assert!(!session.is_initialized());
        assert!(!session.has_temp_media());
        assert!(session.error_message().is_some());
    }

    #[test]
    fn test_controller_initialize_failure_runs_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let handle = MockHandle::new();
        handle.configure(|s| s.fail_initialize = true);
        let mut session = PreviewSession::new(config_in(dir.path()));
        let controller = handle.controller();

        session.initialize(b"fake video", move |_| Ok(controller));

        assert!(session.error_message().is_some());
        assert_eq!(handle.commands().last(), Some(&Command::Dispose));
        assert!(session.controller().is_none());
        session.wait_for_cleanup();
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn test_seek_forwards_position() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, handle) = started(dir.path());
        session.seek(Duration::from_secs(4));
        assert_eq!(handle.commands(), vec![Command::SeekTo(Duration::from_secs(4))]);
    }
}
