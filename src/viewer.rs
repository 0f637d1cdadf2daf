// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 结果显示窗口 (macroquad)

use anyhow::Result;
use image::RgbImage;
use macroquad::prelude::*;

pub const WINDOW_TITLE: &str = "Traffic Detection Result";

/// 窗口最大尺寸, 大图按比例缩小显示
const MAX_WINDOW_WIDTH: u32 = 1280;
const MAX_WINDOW_HEIGHT: u32 = 960;

/// 结果显示
pub trait Viewer {
    /// 阻塞显示, 直到用户关闭
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()>;
}

/// 不显示 (`--nosh`)
#[derive(Debug, Default)]
pub struct NoopViewer;

impl Viewer for NoopViewer {
    fn show(&mut self, _title: &str, _image: &RgbImage) -> Result<()> {
        Ok(())
    }
}

/// macroquad 窗口, 任意键或关闭窗口退出
///
/// macroquad 每个进程只能启动一次事件循环
#[derive(Debug, Default)]
pub struct WindowViewer;

impl WindowViewer {
    pub fn new() -> Self {
        Self
    }
}

/// 窗口尺寸: 不超过上限, 保持宽高比
pub fn window_size(width: u32, height: u32) -> (u32, u32) {
    let r = (MAX_WINDOW_WIDTH as f32 / width as f32)
        .min(MAX_WINDOW_HEIGHT as f32 / height as f32)
        .min(1.0);
    (
        ((width as f32 * r).round() as u32).max(1),
        ((height as f32 * r).round() as u32).max(1),
    )
}

impl Viewer for WindowViewer {
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()> {
        let (width, height) = (image.width(), image.height());
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            anyhow::bail!("image too large to display: {width}x{height}");
        }
        let (window_width, window_height) = window_size(width, height);
        let rgba = image::DynamicImage::ImageRgb8(image.clone()).into_rgba8();

        let conf = macroquad::window::Conf {
            window_title: title.to_string(),
            window_width: window_width as i32,
            window_height: window_height as i32,
            high_dpi: true,
            ..Default::default()
        };

        log::debug!("Showing {width}x{height} result in a {window_width}x{window_height} window");
        macroquad::Window::from_config(conf, async move {
            let texture = Texture2D::from_rgba8(width as u16, height as u16, rgba.as_raw());
            texture.set_filter(FilterMode::Linear);
            prevent_quit();

            loop {
                if get_last_key_pressed().is_some() || is_quit_requested() {
                    break;
                }
                clear_background(BLACK);

                // 居中等比显示
                let scale =
                    (screen_width() / texture.width()).min(screen_height() / texture.height());
                let (w, h) = (texture.width() * scale, texture.height() * scale);
                draw_texture_ex(
                    &texture,
                    (screen_width() - w) / 2.0,
                    (screen_height() - h) / 2.0,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(w, h)),
                        ..Default::default()
                    },
                );

                next_frame().await;
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size() {
        assert_eq!(window_size(810, 1080), (720, 960));
        assert_eq!(window_size(640, 480), (640, 480));
        assert_eq!(window_size(2560, 1440), (1280, 720));
    }
}
