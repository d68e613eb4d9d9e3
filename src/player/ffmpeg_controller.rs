use crate::core::{AudioFrame, ControllerValue, PlaybackClock, PreviewError, Result, VideoFrame};
use crate::player::audio_output::AudioOutput;
use crate::player::controller::{ValueNotifier, VideoController};
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer::{Demuxer, PacketKind};
use crate::player::backend;
use crossbeam::queue::SegQueue;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 解码线程最多领先的视频帧数
const MAX_VIDEO_FRAMES: usize = 24;
/// 解码线程最多领先的音频帧数
const MAX_AUDIO_FRAMES: usize = 256;
/// 音频输出缓冲上限（采样数），超过后本次 tick 不再写入
const MAX_BUFFERED_SAMPLES: usize = 96_000;
/// 比播放时钟落后超过该值的音频帧直接丢弃
const AUDIO_LATE_DROP_MS: i64 = 500;
/// Seek 后早于目标该值的帧被丢弃
const SEEK_TOLERANCE_MS: i64 = 1000;
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// 解码线程与控制器共享的帧队列
#[derive(Default)]
struct FrameQueues {
    video: Mutex<VecDeque<VideoFrame>>,
    audio: SegQueue<AudioFrame>,
}

impl FrameQueues {
    fn clear(&self) {
        self.video.lock().clear();
        while self.audio.pop().is_some() {}
    }

    fn is_drained(&self) -> bool {
        self.video.lock().is_empty() && self.audio.is_empty()
    }
}

/// 解码线程：解封装 + 音视频解码，响应 seek 命令
struct DecodeWorker {
    demuxer: Demuxer,
    video_decoder: VideoDecoder,
    audio_decoder: Option<AudioDecoder>,
    queues: Arc<FrameQueues>,
    seek_rx: Receiver<i64>,
    running: Arc<AtomicBool>,
    reached_end: Arc<AtomicBool>,
}

impl DecodeWorker {
    fn run(mut self) {
        info!("🎞️ 解码线程启动");
        let mut seek_target: Option<i64> = None;

        while self.running.load(Ordering::SeqCst) {
            // 合并堆积的 seek 命令，只执行最后一个
            if let Some(target) = self.seek_rx.try_iter().last() {
                self.apply_seek(target);
                seek_target = Some(target);
                continue;
            }

            if self.reached_end.load(Ordering::SeqCst) || self.queues_full() {
                thread::sleep(IDLE_WAIT);
                continue;
            }

            let keep = |pts: i64| seek_target.map_or(true, |target| pts >= target - SEEK_TOLERANCE_MS);

            match self.demuxer.read_packet() {
                Some((PacketKind::Video, packet)) => match self.video_decoder.decode(&packet) {
                    Ok(frames) => self.push_video(frames.into_iter().filter(|f| keep(f.pts))),
                    Err(e) => warn!("视频解码失败（已跳过）: {}", e),
                },
                Some((PacketKind::Audio, packet)) => {
                    if let Some(decoder) = &mut self.audio_decoder {
                        match decoder.decode(&packet) {
                            Ok(frames) => frames
                                .into_iter()
                                .filter(|f| keep(f.pts))
                                .for_each(|f| self.queues.audio.push(f)),
                            Err(e) => warn!("音频解码失败（已跳过）: {}", e),
                        }
                    }
                }
                None => {
                    match self.video_decoder.drain() {
                        Ok(frames) => self.push_video(frames.into_iter().filter(|f| keep(f.pts))),
                        Err(e) => debug!("刷新视频解码器失败: {}", e),
                    }
                    info!("📄 文件读取完毕");
                    self.reached_end.store(true, Ordering::SeqCst);
                }
            }
        }
        info!("🎞️ 解码线程结束");
    }

    fn push_video(&self, frames: impl Iterator<Item = VideoFrame>) {
        self.queues.video.lock().extend(frames);
    }

    fn queues_full(&self) -> bool {
        self.queues.video.lock().len() >= MAX_VIDEO_FRAMES || self.queues.audio.len() >= MAX_AUDIO_FRAMES
    }

    fn apply_seek(&mut self, target_ms: i64) {
        debug!("🎯 解码线程执行 seek: {} ms", target_ms);
        self.queues.clear();
        if let Err(e) = self.demuxer.seek(target_ms) {
            error!("❌ Demuxer seek 失败: {}", e);
        }
        self.video_decoder.flush();
        if let Some(decoder) = &mut self.audio_decoder {
            decoder.flush();
        }
        self.reached_end.store(false, Ordering::SeqCst);
    }
}

/// 基于 FFmpeg + cpal 的播放控制器
///
/// 命令在 UI 线程上同步执行；解码在独立线程中进行，
/// 帧的消费、音频写入和位置上报由 [`VideoController::tick`] 驱动。
pub struct FfmpegController {
    source: PathBuf,
    value: ControllerValue,
    clock: PlaybackClock,
    queues: Arc<FrameQueues>,
    running: Arc<AtomicBool>,
    reached_end: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    seek_tx: Option<Sender<i64>>,
    audio_output: Option<AudioOutput>,
    current_frame: Option<VideoFrame>,
    notifier: ValueNotifier,
    notify_interval: Duration,
    last_notified_position: Duration,
    disposed: bool,
}

impl FfmpegController {
    pub fn new(source: &Path, notify_interval: Duration) -> Self {
        Self {
            source: source.to_path_buf(),
            value: ControllerValue::default(),
            clock: PlaybackClock::new(),
            queues: Arc::new(FrameQueues::default()),
            running: Arc::new(AtomicBool::new(false)),
            reached_end: Arc::new(AtomicBool::new(false)),
            worker: None,
            seek_tx: None,
            audio_output: None,
            current_frame: None,
            notifier: ValueNotifier::new(),
            notify_interval,
            last_notified_position: Duration::ZERO,
            disposed: false,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.disposed {
            Err(PreviewError::Disposed)
        } else if !self.value.initialized {
            Err(PreviewError::NotInitialized)
        } else {
            Ok(())
        }
    }

    fn notify(&mut self) {
        self.last_notified_position = self.value.position;
        self.notifier.notify(self.value);
    }

    fn at_end(&self) -> bool {
        self.reached_end.load(Ordering::SeqCst) && self.queues.is_drained()
    }

    fn seek_internal(&mut self, target_ms: i64) {
        self.queues.clear();
        self.clock.set_time(target_ms);
        if let Some(output) = &self.audio_output {
            output.clear_buffer();
        }
        // 先清标志，避免 tick 在解码线程处理 seek 前误判为结束
        self.reached_end.store(false, Ordering::SeqCst);
        if let Some(tx) = &self.seek_tx {
            if let Err(e) = tx.send(target_ms) {
                error!("❌ 发送 seek 命令失败: {}", e);
            }
        }
        self.value.position = Duration::from_millis(target_ms.max(0) as u64);
    }

    fn feed_audio(&mut self) {
        let Some(output) = &self.audio_output else {
            return;
        };
        let now = self.clock.now();
        let expected = output.config();
        while output.buffer_size() < MAX_BUFFERED_SAMPLES {
            let Some(frame) = self.queues.audio.pop() else {
                break;
            };
            if frame.pts < now - AUDIO_LATE_DROP_MS {
                continue;
            }
            if (frame.sample_rate, frame.channels) != expected {
                debug!(
                    "丢弃格式不符的音频帧: {} Hz/{} 声道，设备 {} Hz/{} 声道",
                    frame.sample_rate, frame.channels, expected.0, expected.1
                );
                continue;
            }
            output.write_frame(&frame);
        }
    }

    fn advance_video_frame(&mut self) {
        let now = self.clock.now();
        let mut queue = self.queues.video.lock();
        // 暂停时也要有一帧可显示
        if self.current_frame.is_none() {
            self.current_frame = queue.pop_front();
        }
        while queue.front().map_or(false, |frame| frame.pts <= now) {
            self.current_frame = queue.pop_front();
        }
    }

    fn handle_end_of_stream(&mut self) {
        if self.value.is_looping {
            info!("🔁 播放结束，循环播放");
            self.seek_internal(0);
        } else {
            info!("⏹️  播放结束");
            self.clock.pause();
            self.value.is_playing = false;
            self.value.position = self.value.duration;
        }
        self.notify();
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

impl VideoController for FfmpegController {
    fn initialize(&mut self) -> Result<ControllerValue> {
        if self.disposed {
            return Err(PreviewError::Disposed);
        }
        if self.value.initialized {
            return Ok(self.value);
        }

        backend::ensure_registered()?;

        let demuxer = Demuxer::open(&self.source)?;
        let info = demuxer.media_info().clone();
        info!(
            "📎 媒体信息: {}x{} @ {:.2} fps, 视频 {}, 音频 {}, 时长 {} ms",
            info.width,
            info.height,
            info.fps,
            info.video_codec,
            info.audio_codec.as_deref().unwrap_or("无"),
            info.duration
        );

        let video_decoder = VideoDecoder::from_stream(demuxer.video_stream()?)?;

        self.audio_output = if info.has_audio() {
            let output = AudioOutput::new(info.sample_rate, info.channels).and_then(|mut output| {
                output.start()?;
                Ok(output)
            });
            match output {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!("❌ 创建音频输出失败，无声播放: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let audio_decoder = match (demuxer.audio_stream()?, &self.audio_output) {
            (Some(stream), Some(output)) => {
                let (rate, channels) = output.config();
                Some(AudioDecoder::from_stream(stream, rate, channels)?)
            }
            _ => None,
        };

        let (seek_tx, seek_rx) = unbounded();
        self.running.store(true, Ordering::SeqCst);
        self.reached_end.store(false, Ordering::SeqCst);

        let worker = DecodeWorker {
            demuxer,
            video_decoder,
            audio_decoder,
            queues: self.queues.clone(),
            seek_rx,
            running: self.running.clone(),
            reached_end: self.reached_end.clone(),
        };
        let handle = thread::Builder::new()
            .name("preview-decode".to_string())
            .spawn(move || worker.run())?;

        self.worker = Some(handle);
        self.seek_tx = Some(seek_tx);
        self.clock.set_time(0);

        self.value = ControllerValue {
            initialized: true,
            is_playing: false,
            is_looping: false,
            volume: 1.0,
            position: Duration::ZERO,
            duration: Duration::from_millis(info.duration as u64),
            aspect_ratio: info.aspect_ratio(),
        };
        self.notify();

        info!("✅ 控制器初始化完成: {}", self.source.display());
        Ok(self.value)
    }

    fn play(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if self.at_end() {
            debug!("已在结尾，从头播放");
            self.seek_internal(0);
        }
        self.clock.play();
        self.value.is_playing = true;
        self.notify();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.clock.pause();
        // 立即丢弃已送入设备的采样，避免暂停后仍有声音
        if let Some(output) = &self.audio_output {
            output.clear_buffer();
        }
        self.value.is_playing = false;
        self.value.position = Duration::from_millis(self.clock.now().max(0) as u64);
        self.notify();
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.ensure_ready()?;
        self.value.is_looping = looping;
        self.notify();
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_ready()?;
        let volume = volume.clamp(0.0, 1.0);
        if let Some(output) = &self.audio_output {
            output.set_volume(volume);
        }
        self.value.volume = volume;
        self.notify();
        Ok(())
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        self.ensure_ready()?;
        let target = if self.value.duration > Duration::ZERO {
            position.min(self.value.duration)
        } else {
            position
        };
        info!("🎯 Seek 到: {} ms", target.as_millis());
        self.seek_internal(target.as_millis() as i64);
        self.notify();
        Ok(())
    }

    fn value(&self) -> ControllerValue {
        self.value
    }

    fn add_listener(&mut self) -> Receiver<ControllerValue> {
        self.notifier.subscribe()
    }

    fn tick(&mut self) {
        if self.disposed || !self.value.initialized {
            return;
        }

        if self.value.is_playing {
            self.feed_audio();
        }
        self.advance_video_frame();

        if self.value.is_playing && self.at_end() {
            self.handle_end_of_stream();
            return;
        }

        let mut position = Duration::from_millis(self.clock.now().max(0) as u64);
        if self.value.duration > Duration::ZERO {
            position = position.min(self.value.duration);
        }
        self.value.position = position;

        if abs_diff(position, self.last_notified_position) >= self.notify_interval {
            self.notify();
        }
    }

    fn current_frame(&self) -> Option<&VideoFrame> {
        self.current_frame.as_ref()
    }

    fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        info!("🧹 释放控制器: {}", self.source.display());

        self.running.store(false, Ordering::SeqCst);
        self.seek_tx = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("⚠️  解码线程异常退出");
            }
        }

        if let Some(mut output) = self.audio_output.take() {
            output.stop();
        }
        self.queues.clear();
        self.current_frame = None;
        self.clock.pause();

        self.value.is_playing = false;
        self.notify();
        self.notifier.clear();
        Ok(())
    }
}

impl Drop for FfmpegController {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("释放控制器失败: {}", e);
        }
    }
}
