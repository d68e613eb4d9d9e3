// 渲染模块：把解码帧显示到 egui

pub mod video_surface;

pub use video_surface::{fit_rect, VideoSurface};
