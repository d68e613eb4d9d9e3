//! 进程级播放后端注册
//!
//! FFmpeg 的全局初始化只执行一次，结果被缓存；之后每个预览实例
//! 只做能力检查，不再重复注册。

use crate::core::{PreviewError, Result};
use log::{error, info};
use std::sync::OnceLock;

static REGISTRATION: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// 注册 FFmpeg 后端（进程内只执行一次，重复调用返回缓存结果）
pub fn ensure_registered() -> Result<()> {
    REGISTRATION
        .get_or_init(|| match ffmpeg_next::init() {
            Ok(()) => {
                ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
                info!("✅ FFmpeg 后端注册成功");
                Ok(())
            }
            Err(e) => {
                error!("❌ FFmpeg 后端注册失败: {}", e);
                Err(e.to_string())
            }
        })
        .clone()
        .map_err(PreviewError::BackendUnavailable)
}

/// 后端是否已成功注册
pub fn is_available() -> bool {
    matches!(REGISTRATION.get(), Some(Ok(())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_idempotent() {
        let first = ensure_registered().is_ok();
        let second = ensure_registered().is_ok();
        assert_eq!(first, second);
        assert_eq!(is_available(), first);
    }
}
