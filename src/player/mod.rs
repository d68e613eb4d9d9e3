// 播放器模块：后端注册、控制器契约与 FFmpeg 实现

pub mod audio_output;
pub mod backend;
pub mod controller;
pub mod decoder;
pub mod demuxer;
pub mod ffmpeg_controller;

#[cfg(test)]
pub mod mock_controller;

pub use controller::VideoController;
pub use ffmpeg_controller::FfmpegController;
