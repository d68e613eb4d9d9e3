use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("播放后端不可用: {0}")]
    BackendUnavailable(String),

    #[error("控制器尚未初始化")]
    NotInitialized,

    #[error("控制器已释放")]
    Disposed,

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
