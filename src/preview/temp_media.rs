use crate::core::{PreviewConfig, Result};
use log::{debug, info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// 保存源字节的临时文件，由预览会话独占
#[derive(Debug)]
pub struct TempMedia {
    path: PathBuf,
}

impl TempMedia {
    /// 把字节写入新的临时文件
    pub fn write(bytes: &[u8], config: &PreviewConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("video_preview_").suffix(&config.file_suffix);

        let mut file = match &config.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;

        // 之后的生命周期由会话管理（延迟删除），不随句柄自动删除
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        info!("💾 已写入临时文件: {} ({} 字节)", path.display(), bytes.len());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 在后台线程中等待 `grace` 后删除文件
    ///
    /// 文件已不存在不算错误，其他错误只记录日志。
    pub fn remove_after(self, grace: Duration) -> thread::JoinHandle<()> {
        let path = self.path;
        thread::spawn(move || {
            thread::sleep(grace);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("🗑️  已删除临时文件: {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("临时文件已不存在: {}", path.display())
                }
                Err(e) => warn!("⚠️  删除临时文件失败 {}: {}", path.display(), e),
            }
        })
    }
}
