use anyhow::{Context as _, Result};
use log::{info, warn};
use std::path::PathBuf;

mod app;
mod core;
mod player;
mod preview;
mod renderer;

use app::VideoPreviewerApp;
use crate::core::PreviewConfig;

const USAGE: &str = "用法: video_previewer [--config <file.json>] [<video file>]";

fn pick_video_file() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("选择要预览的视频")
        .add_filter("视频文件", &["mp4", "mov", "mkv", "webm", "avi", "m4v"])
        .pick_file()
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        println!("{}", USAGE);
        return Ok(());
    }
    let config_path: Option<PathBuf> = args.opt_value_from_str("--config")?;
    let video_path = args
        .finish()
        .into_iter()
        .next()
        .map(PathBuf::from)
        .or_else(pick_video_file);

    let Some(video_path) = video_path else {
        info!("未选择视频文件，退出");
        return Ok(());
    };

    let config = PreviewConfig::load(config_path.as_deref())?;
    let bytes = std::fs::read(&video_path)
        .with_context(|| format!("读取视频文件失败: {}", video_path.display()))?;
    info!("🎬 视频预览启动: {} ({} 字节)", video_path.display(), bytes.len());

    // 进程内只注册一次，失败时由预览视图显示错误
    if let Err(e) = player::backend::ensure_registered() {
        warn!("⚠️  {}", e);
    }

    let title = video_path
        .file_name()
        .map(|name| format!("预览 - {}", name.to_string_lossy()))
        .unwrap_or_else(|| "视频预览".to_string());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([480.0, 320.0])
            .with_title(title),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };

    eframe::run_native(
        "视频预览",
        options,
        Box::new(move |cc| Box::new(VideoPreviewerApp::new(cc, bytes, config))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    Ok(())
}
