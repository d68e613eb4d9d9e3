use crate::core::{PreviewError, Result};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 预览组件的可调参数
///
/// 所有字段都有默认值，JSON 文件中只需写出想覆盖的字段。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// 暂停意图下允许的最大音量，超过即重新静音
    pub volume_epsilon: f32,
    /// 位置跳变超过该值（毫秒）时记录日志
    pub position_jump_threshold_ms: u64,
    /// 连续纠正失败多少次后放弃并报错
    pub max_corrections: u32,
    /// 释放控制器后删除临时文件前的等待时间（毫秒）
    pub temp_file_grace_ms: u64,
    /// 播放中位置通知的最小间隔（毫秒）
    pub position_notify_interval_ms: u64,
    /// 临时文件后缀，FFmpeg 依靠它探测容器格式
    pub file_suffix: String,
    /// 临时文件目录，缺省使用系统临时目录
    pub temp_dir: Option<PathBuf>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            volume_epsilon: 0.01,
            position_jump_threshold_ms: 1000,
            max_corrections: 3,
            temp_file_grace_ms: 500,
            position_notify_interval_ms: 250,
            file_suffix: ".mp4".to_string(),
            temp_dir: None,
        }
    }
}

impl PreviewConfig {
    /// 从 JSON 文件加载配置；未提供路径时使用默认值
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        info!("📄 加载配置文件: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| PreviewError::ConfigError(format!("解析配置失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume_epsilon) {
            return Err(PreviewError::ConfigError(format!(
                "volume_epsilon 必须在 0.0 - 1.0 之间: {}",
                self.volume_epsilon
            )));
        }
        if self.max_corrections == 0 {
            return Err(PreviewError::ConfigError("max_corrections 不能为 0".to_string()));
        }
        Ok(())
    }

    pub fn position_jump_threshold(&self) -> Duration {
        Duration::from_millis(self.position_jump_threshold_ms)
    }

    pub fn temp_file_grace(&self) -> Duration {
        Duration::from_millis(self.temp_file_grace_ms)
    }

    pub fn position_notify_interval(&self) -> Duration {
        Duration::from_millis(self.position_notify_interval_ms)
    }
}
