use egui::{ColorImage, Context, FontData, FontDefinitions, FontFamily, TextureHandle, TextureOptions, Ui};
use log::{error, info, warn};
use std::path::Path;
use std::time::Duration;

use crate::core::PreviewConfig;
use crate::player::{FfmpegController, VideoController};
use crate::preview::PreviewSession;
use crate::renderer::{fit_rect, VideoSurface};

/// 内存视频预览窗口
pub struct VideoPreviewerApp {
    session: PreviewSession<FfmpegController>,
    /// 首次 update 时交给会话的视频字节
    pending_bytes: Option<Vec<u8>>,
    notify_interval: Duration,
    surface: VideoSurface,
    icons: Option<ControlIcons>,
    scrub: ScrubState,
}

#[derive(Default)]
struct ScrubState {
    dragging: bool,
    position: f64,
}

struct ControlIcons {
    play: TextureHandle,
    pause: TextureHandle,
}

impl VideoPreviewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, bytes: Vec<u8>, config: PreviewConfig) -> Self {
        info!("🎮 初始化 VideoPreviewerApp ({} 字节)", bytes.len());

        Self::setup_chinese_fonts(&cc.egui_ctx);
        Self::setup_window_theme(&cc.egui_ctx);
        let icons = Self::create_control_icons(&cc.egui_ctx);

        Self {
            notify_interval: config.position_notify_interval(),
            session: PreviewSession::new(config),
            pending_bytes: Some(bytes),
            surface: VideoSurface::new(),
            icons: Some(icons),
            scrub: ScrubState::default(),
        }
    }

    fn setup_window_theme(ctx: &Context) {
        let mut style = (*ctx.style()).clone();
        style.visuals.dark_mode = true;
        style.visuals.window_fill = egui::Color32::from_rgb(29, 29, 29);
        style.visuals.panel_fill = egui::Color32::from_rgb(29, 29, 29);
        ctx.set_style(style);
    }

    /// 配置中文字体支持
    fn setup_chinese_fonts(ctx: &Context) {
        let mut fonts = FontDefinitions::default();

        #[cfg(target_os = "windows")]
        let font_paths = ["C:/Windows/Fonts/msyh.ttc", "C:/Windows/Fonts/simhei.ttf"];
        #[cfg(target_os = "macos")]
        let font_paths = ["/System/Library/Fonts/PingFang.ttc", "/System/Library/Fonts/STHeiti Light.ttc"];
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let font_paths = [
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ];

        let loaded = font_paths
            .iter()
            .filter(|path| Path::new(path).exists())
            .find_map(|path| match std::fs::read(path) {
                Ok(data) => Some((*path, data)),
                Err(e) => {
                    warn!("⚠️ 无法读取字体文件 {}: {}", path, e);
                    None
                }
            });

        match loaded {
            Some((path, data)) => {
                fonts
                    .font_data
                    .insert("chinese_font".to_owned(), FontData::from_owned(data));
                for family in [FontFamily::Proportional, FontFamily::Monospace] {
                    if let Some(list) = fonts.families.get_mut(&family) {
                        list.insert(0, "chinese_font".to_owned());
                    }
                }
                info!("✅ 成功加载中文字体: {}", path);
            }
            None => warn!("⚠️ 未找到可用的中文字体文件，中文可能显示为方块"),
        }

        ctx.set_fonts(fonts);
    }

    /// 播放/暂停图标（Codicons SVG，经 resvg 渲染）
    fn create_control_icons(ctx: &Context) -> ControlIcons {
        let icon_size = 96;

        let play_svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16 16"><path d="M3 3v10l10-5z" fill="white"/></svg>"#;
        let play = ctx.load_texture("play_icon", svg_to_image(play_svg, icon_size), TextureOptions::LINEAR);

        let pause_svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16 16"><path d="M4.5 3C4.22386 3 4 3.22386 4 3.5V12.5C4 12.7761 4.22386 13 4.5 13H7.5C7.77614 13 8 12.7761 8 12.5V3.5C8 3.22386 7.77614 3 7.5 3H4.5ZM9.5 3C9.22386 3 9 3.22386 9 3.5V12.5C9 12.7761 9.22386 13 9.5 13H12.5C12.7761 13 13 12.7761 13 12.5V3.5C13 3.22386 12.7761 3 12.5 3H9.5Z" fill="white"/></svg>"#;
        let pause = ctx.load_texture("pause_icon", svg_to_image(pause_svg, icon_size), TextureOptions::LINEAR);

        ControlIcons { play, pause }
    }

    fn initialize_session(&mut self) {
        let Some(bytes) = self.pending_bytes.take() else {
            return;
        };
        let interval = self.notify_interval;
        self.session
            .initialize(&bytes, |path| Ok(FfmpegController::new(path, interval)));
    }

    fn render_video_area(&mut self, ui: &mut Ui) {
        let rect = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(rect, egui::Sense::click());
        ui.painter().rect_filled(rect, 0.0, egui::Color32::BLACK);

        if !self.session.is_initialized() {
            match self.session.error_message() {
                Some(message) => Self::render_error_message(ui, rect, message),
                None => Self::render_loading(ui, rect),
            }
            return;
        }

        let aspect_ratio = self.session.value().map(|v| v.aspect_ratio).unwrap_or(1.0);
        let frame = self.session.controller().and_then(|c| c.current_frame());
        self.surface.show(ui, frame, aspect_ratio, rect);

        if !self.session.is_playing() {
            if let Some(icons) = &self.icons {
                let icon_rect = egui::Rect::from_center_size(rect.center(), egui::vec2(72.0, 72.0));
                ui.painter().circle_filled(
                    rect.center(),
                    56.0,
                    egui::Color32::from_rgba_unmultiplied(0, 0, 0, 140),
                );
                ui.painter().image(
                    icons.play.id(),
                    icon_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }
        }

        if let Some(message) = self.session.error_message() {
            Self::render_warning_banner(ui, fit_rect(aspect_ratio, rect), message);
        }

        if response.clicked() {
            self.session.toggle();
        }
        if response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
    }

    fn render_loading(ui: &mut Ui, rect: egui::Rect) {
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.label(
                    egui::RichText::new("⏳ 正在加载视频...")
                        .size(20.0)
                        .color(egui::Color32::LIGHT_GRAY),
                );
            });
        });
    }

    /// 渲染错误信息
    fn render_error_message(ui: &mut Ui, rect: egui::Rect, message: &str) {
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.vertical_centered(|ui| {
                    ui.label(egui::RichText::new("❌").size(48.0).color(egui::Color32::RED));
                    ui.add_space(10.0);
                    ui.label(
                        egui::RichText::new(message)
                            .size(16.0)
                            .color(egui::Color32::LIGHT_RED),
                    );
                });
            });
        });
    }

    fn render_warning_banner(ui: &mut Ui, video_rect: egui::Rect, message: &str) {
        let banner = egui::Rect::from_min_size(
            video_rect.left_top() + egui::vec2(12.0, 12.0),
            egui::vec2((video_rect.width() - 24.0).max(0.0), 32.0),
        );
        ui.painter()
            .rect_filled(banner, 4.0, egui::Color32::from_rgba_unmultiplied(120, 20, 20, 200));
        ui.painter().text(
            banner.left_center() + egui::vec2(10.0, 0.0),
            egui::Align2::LEFT_CENTER,
            format!("⚠ {}", message),
            egui::FontId::proportional(14.0),
            egui::Color32::WHITE,
        );
    }

    /// 底部进度条：拖动结束时 seek
    fn render_controls_panel(&mut self, ctx: &Context) {
        let Some(value) = self.session.value() else {
            return;
        };
        let duration = value.duration.as_secs_f64();
        let position = value.position.as_secs_f64();

        egui::TopBottomPanel::bottom("controls")
            .resizable(false)
            .exact_height(44.0)
            .frame(egui::Frame::none().fill(egui::Color32::from_rgb(29, 29, 29)))
            .show_separator_line(false)
            .show(ctx, |ui| {
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    ui.spacing_mut().item_spacing = egui::Vec2::new(8.0, 0.0);
                    ui.add_space(12.0);

                    let icon = self.icons.as_ref().map(|icons| {
                        if self.session.is_playing() {
                            icons.pause.id()
                        } else {
                            icons.play.id()
                        }
                    });
                    if let Some(icon) = icon {
                        let button = egui::ImageButton::new((icon, egui::vec2(18.0, 18.0))).frame(false);
                        if ui.add(button).clicked() {
                            self.session.toggle();
                        }
                    }

                    ui.label(
                        egui::RichText::new(format_time(position))
                            .size(12.0)
                            .color(egui::Color32::WHITE),
                    );

                    let mut seek_pos = if self.scrub.dragging {
                        self.scrub.position
                    } else {
                        position
                    };
                    let slider_width = (ui.available_width() - 72.0).max(40.0);
                    ui.style_mut().spacing.slider_width = slider_width;
                    ui.style_mut().spacing.slider_rail_height = 2.0;
                    let response = ui.add(
                        egui::Slider::new(&mut seek_pos, 0.0..=duration.max(0.001)).show_value(false),
                    );

                    if response.drag_started() {
                        self.scrub.dragging = true;
                    }
                    if response.dragged() || response.changed() {
                        self.scrub.position = seek_pos;
                    }
                    if response.drag_stopped() || (response.changed() && !response.dragged()) {
                        info!("拖拽结束，seek 到: {:.2}s", self.scrub.position);
                        self.scrub.dragging = false;
                        self.session
                            .seek(Duration::from_secs_f64(self.scrub.position.max(0.0)));
                    }

                    ui.label(
                        egui::RichText::new(format_time(duration))
                            .size(12.0)
                            .color(egui::Color32::GRAY),
                    );
                });
            });
    }

    fn handle_keyboard_input(&mut self, ctx: &Context) {
        if take_space_toggle(ctx) {
            self.session.toggle();
        }
    }
}

impl eframe::App for VideoPreviewerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.initialize_session();
        self.session.pump();
        // 先于控件处理，被消费的空格不会再触发按钮
        self.handle_keyboard_input(ctx);

        self.render_controls_panel(ctx);
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.render_video_area(ui);
            });

        ctx.request_repaint_after(Duration::from_millis(16));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 VideoPreviewerApp 退出");
        self.session.dispose();
        self.surface.clear();
        self.session.wait_for_cleanup();
    }
}

/// 取走全局空格键
///
/// 有控件获得焦点时空格属于该控件（例如聚焦的播放按钮），这里不处理。
fn take_space_toggle(ctx: &Context) -> bool {
    if ctx.memory(|m| m.focused().is_some()) {
        return false;
    }
    ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Space))
}

/// 将 SVG 字符串转换为 egui ColorImage
fn svg_to_image(svg_str: &str, size: usize) -> ColorImage {
    use usvg::{Options, Tree, TreeParsing};

    let tree = match Tree::from_str(svg_str, &Options::default()) {
        Ok(tree) => tree,
        Err(e) => {
            error!("解析 SVG 失败: {}", e);
            return create_placeholder_image(size);
        }
    };

    let Some(mut pixmap) = tiny_skia::Pixmap::new(size as u32, size as u32) else {
        error!("创建 Pixmap 失败");
        return create_placeholder_image(size);
    };

    let svg_size = tree.view_box.rect.size();
    let scale = (size as f32 / svg_size.width()).min(size as f32 / svg_size.height());
    let x = (size as f32 - svg_size.width() * scale) / 2.0;
    let y = (size as f32 - svg_size.height() * scale) / 2.0;
    let transform = tiny_skia::Transform::from_translate(x, y).post_scale(scale, scale);

    pixmap.fill(tiny_skia::Color::TRANSPARENT);
    resvg::Tree::from_usvg(&tree).render(transform, &mut pixmap.as_mut());

    // tiny-skia 输出预乘 alpha，egui 需要非预乘
    let pixels: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let alpha = p.alpha();
            if alpha == 0 {
                return [0, 0, 0, 0];
            }
            let alpha_f = alpha as f32 / 255.0;
            let unmultiply = |c: u8| (c as f32 / alpha_f).clamp(0.0, 255.0) as u8;
            [unmultiply(p.red()), unmultiply(p.green()), unmultiply(p.blue()), alpha]
        })
        .collect();

    ColorImage::from_rgba_unmultiplied([size, size], &pixels)
}

/// SVG 渲染失败时的灰色占位图标
fn create_placeholder_image(size: usize) -> ColorImage {
    let image = image::RgbaImage::from_pixel(size as u32, size as u32, image::Rgba([200, 200, 200, 255]));
    ColorImage::from_rgba_unmultiplied([size, size], image.as_raw())
}

/// 格式化时间显示
fn format_time(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(65.9), "01:05");
        assert_eq!(format_time(3725.0), "01:02:05");
        assert_eq!(format_time(-3.0), "00:00");
    }

    #[test]
    fn test_svg_icon_renders_opaque_pixels() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16 16"><rect x="0" y="0" width="16" height="16" fill="white"/></svg>"#;
        let image = svg_to_image(svg, 8);
        assert_eq!(image.size, [8, 8]);
        assert_eq!(image.pixels[4 * 8 + 4].a(), 255);
    }

    fn space_press() -> egui::RawInput {
        egui::RawInput {
            events: vec![egui::Event::Key {
                key: egui::Key::Space,
                physical_key: None,
                pressed: true,
                repeat: false,
                modifiers: egui::Modifiers::NONE,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_space_toggles_once_per_press() {
        let ctx = Context::default();
        let mut toggles = 0;
        let _ = ctx.run(space_press(), |ctx| {
            for _ in 0..2 {
                if take_space_toggle(ctx) {
                    toggles += 1;
                }
            }
            assert!(!ctx.input(|i| i.key_pressed(egui::Key::Space)));
        });
        assert_eq!(toggles, 1);
    }

    #[test]
    fn test_space_is_left_to_focused_widget() {
        let ctx = Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.button("play").request_focus();
            });
        });
        let _ = ctx.run(space_press(), |ctx| {
            assert!(!take_space_toggle(ctx));
            assert!(ctx.input(|i| i.key_pressed(egui::Key::Space)));
            egui::CentralPanel::default().show(ctx, |ui| {
                let _ = ui.button("play");
            });
        });
    }

    #[test]
    fn test_invalid_svg_falls_back_to_placeholder() {
        let image = svg_to_image("not svg", 4);
        assert_eq!(image.pixels[0], egui::Color32::from_rgb(200, 200, 200));
    }
}
