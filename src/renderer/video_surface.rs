use egui::{ColorImage, Rect, TextureHandle, TextureOptions, Ui, Vec2};
use log::{debug, info};

use crate::core::VideoFrame;

/// 视频帧的 egui 纹理
///
/// 只在帧 PTS 或尺寸变化时重新上传，同一帧的重绘直接复用纹理。
#[derive(Default)]
pub struct VideoSurface {
    texture: Option<SurfaceTexture>,
    /// 实际上传到纹理的帧数
    uploads: u64,
}

struct SurfaceTexture {
    handle: TextureHandle,
    width: u32,
    height: u32,
    last_pts: i64,
}

/// 在 `rect` 中按宽高比居中放置视频
pub fn fit_rect(aspect_ratio: f32, rect: Rect) -> Rect {
    if aspect_ratio <= 0.0 || rect.height() <= 0.0 {
        return rect;
    }
    let rect_aspect = rect.width() / rect.height();

    let size = if aspect_ratio > rect_aspect {
        // 视频更宽，以宽度为准
        Vec2::new(rect.width(), rect.width() / aspect_ratio)
    } else {
        Vec2::new(rect.height() * aspect_ratio, rect.height())
    };

    Rect::from_center_size(rect.center(), size)
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// 上传新帧（如有）并绘制到 `rect`
    pub fn show(&mut self, ui: &mut Ui, frame: Option<&VideoFrame>, aspect_ratio: f32, rect: Rect) {
        if let Some(frame) = frame {
            self.upload(ui.ctx(), frame);
        }

        let Some(texture) = &self.texture else {
            return;
        };
        let display_rect = fit_rect(aspect_ratio, rect);
        ui.painter().image(
            texture.handle.id(),
            display_rect,
            Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }

    fn upload(&mut self, ctx: &egui::Context, frame: &VideoFrame) {
        let expected_len = frame.width as usize * frame.height as usize * 4;
        if frame.data.len() != expected_len {
            debug!("跳过尺寸不符的视频帧: {} 字节，期望 {}", frame.data.len(), expected_len);
            return;
        }

        let same_size = self
            .texture
            .as_ref()
            .map(|tex| tex.width == frame.width && tex.height == frame.height)
            .unwrap_or(false);
        let size = [frame.width as usize, frame.height as usize];

        if let Some(texture) = self.texture.as_mut().filter(|_| same_size) {
            // 同一帧重绘时不复制像素
            if texture.last_pts != frame.pts {
                let image = ColorImage::from_rgba_unmultiplied(size, &frame.data);
                texture.handle.set(image, TextureOptions::LINEAR);
                texture.last_pts = frame.pts;
                self.uploads += 1;
            }
            return;
        }

        info!(
            "🆕 创建视频纹理: {}x{} (此前已上传 {} 帧)",
            frame.width, frame.height, self.uploads
        );
        let image = ColorImage::from_rgba_unmultiplied(size, &frame.data);
        let handle = ctx.load_texture("video_preview_frame", image, TextureOptions::LINEAR);
        self.texture = Some(SurfaceTexture {
            handle,
            width: frame.width,
            height: frame.height,
            last_pts: frame.pts,
        });
        self.uploads += 1;
    }

    #[cfg(test)]
    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn clear(&mut self) {
        self.texture = None;
    }
}
