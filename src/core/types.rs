use std::time::Duration;

/// 视频帧数据（RGBA）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// 音频帧数据
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<f32>,     // 统一使用 f32 交错格式
}

/// 媒体信息
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub duration: i64,          // 总时长（毫秒）
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl MediaInfo {
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

/// 控制器对外推送的状态快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerValue {
    pub initialized: bool,
    pub is_playing: bool,
    pub is_looping: bool,
    /// 0.0 - 1.0
    pub volume: f32,
    pub position: Duration,
    pub duration: Duration,
    pub aspect_ratio: f32,
}

impl Default for ControllerValue {
    fn default() -> Self {
        Self {
            initialized: false,
            is_playing: false,
            is_looping: false,
            volume: 1.0,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            aspect_ratio: 1.0,
        }
    }
}
