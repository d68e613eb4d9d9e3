// 预览模块：临时文件、状态对账与播放会话

pub mod reconcile;
pub mod session;
pub mod temp_media;

pub use session::PreviewSession;
