use crate::core::{AudioFrame, PreviewError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// 设备不支持源配置时依次尝试的标准配置
const FALLBACK_CONFIGS: [(u32, u16); 4] = [(48000, 2), (44100, 2), (48000, 1), (44100, 1)];

/// 音频输出 - 使用 cpal 播放音频
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    buffer: Arc<SegQueue<f32>>,
    /// f32 音量的位表示，供音频回调无锁读取
    volume: Arc<AtomicU32>,
}

impl AudioOutput {
    /// 创建音频输出（不支持的配置自动回退到标准配置）
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PreviewError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let supported: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| PreviewError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
            .collect();

        let candidates = std::iter::once((sample_rate, channels)).chain(FALLBACK_CONFIGS);
        let mut chosen = None;
        for (rate, ch) in candidates {
            let config = StreamConfig {
                channels: ch,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };
            if supported.iter().any(|range| Self::is_config_compatible(&config, range)) {
                chosen = Some(config);
                break;
            }
        }

        let config = chosen.ok_or_else(|| {
            PreviewError::AudioError(format!(
                "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                sample_rate, channels
            ))
        })?;

        if config.sample_rate.0 != sample_rate || config.channels != channels {
            warn!(
                "⚠️  音频设备不支持 {} Hz, {} 声道，使用 {} Hz, {} 声道",
                sample_rate, channels, config.sample_rate.0, config.channels
            );
        }

        Ok(Self {
            device,
            config,
            stream: None,
            buffer: Arc::new(SegQueue::new()),
            volume: Arc::new(AtomicU32::new(1.0f32.to_bits())),
        })
    }

    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0
            && config.channels == supported.channels()
    }

    /// 启动输出流
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let volume = self.volume.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let vol = f32::from_bits(volume.load(Ordering::Relaxed));
                    for sample in data.iter_mut() {
                        *sample = buffer.pop().map_or(0.0, |value| value * vol);
                    }
                },
                |err| error!("音频流错误: {}", err),
                None,
            )
            .map_err(|e| PreviewError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PreviewError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");
        Ok(())
    }

    /// 停止输出流并丢弃未播放的采样
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.clear_buffer();
            info!("音频输出已停止");
        }
    }

    pub fn write_frame(&self, frame: &AudioFrame) {
        for sample in &frame.data {
            self.buffer.push(*sample);
        }
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// 缓冲区中尚未播放的采样数
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear_buffer(&self) {
        while self.buffer.pop().is_some() {}
    }

    /// 实际使用的音频配置 (采样率, 声道数)
    pub fn config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
