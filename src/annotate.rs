// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 在原图上绘制检测框和标签

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::traffic::TrafficObject;

/// 框/文字颜色 (绿色)
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// 标签底边与检测框上边的距离 (像素)
pub const LABEL_OFFSET: i32 = 10;

/// 绘制统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Annotated {
    pub boxes: usize,
    pub labels: usize,
}

pub struct Annotator {
    font: Option<FontVec>,
    color: Rgb<u8>,
    thickness: u32,
    scale: PxScale,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            color: BOX_COLOR,
            thickness: 2,
            scale: PxScale::from(16.0),
        }
    }

    /// 优先加载字体, 失败时只画框
    pub fn with_font_name(font: &str) -> Self {
        match crate::assets::load_font(font) {
            Ok(font) => Self::new(Some(font)),
            Err(e) => {
                log::warn!("Labels disabled, failed to load font {font}: {e:#}");
                Self::new(None)
            }
        }
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    /// 每个目标画一个矩形框 + 一个 `Name: 0.87` 标签
    pub fn draw(&self, img: &mut RgbImage, objects: &[TrafficObject]) -> Annotated {
        let mut annotated = Annotated::default();
        for obj in objects {
            // 坐标截断取整
            let x1 = obj.bbox.xmin() as i32;
            let y1 = obj.bbox.ymin() as i32;
            let x2 = obj.bbox.xmax() as i32;
            let y2 = obj.bbox.ymax() as i32;

            if self.draw_box(img, x1, y1, x2, y2) {
                annotated.boxes += 1;
            }

            if let Some(font) = self.font.as_ref() {
                let label = obj.label();
                let (_, text_h) = text_size(self.scale, font, &label);
                let y = (y1 - LABEL_OFFSET - text_h as i32).max(0);
                draw_text_mut(img, self.color, x1.max(0), y, self.scale, font, &label);
                annotated.labels += 1;
            }
        }
        annotated
    }

    /// 由外向内逐圈绘制; 宽或高为 0 的框至少画成一条 1 像素的线
    fn draw_box(&self, img: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
        let (w, h) = ((x2 - x1).max(1), (y2 - y1).max(1));
        draw_hollow_rect_mut(img, Rect::at(x1, y1).of_size(w as u32, h as u32), self.color);
        for i in 1..self.thickness as i32 {
            let (w, h) = (w - 2 * i, h - 2 * i);
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + i, y1 + i).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(img, rect, self.color);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bbox;

    fn object(name: &str, bbox: Bbox) -> TrafficObject {
        TrafficObject {
            name: name.to_string(),
            confidence: bbox.confidence(),
            bbox,
        }
    }

    #[test]
    fn test_draws_two_pixel_green_box() {
        let mut img = RgbImage::new(100, 100);
        let objects = vec![object("car", Bbox::from_xyxy(10., 30., 50., 70., 2, 0.9))];

        let annotated = Annotator::new(None).draw(&mut img, &objects);
        assert_eq!(annotated, Annotated { boxes: 1, labels: 0 });

        assert_eq!(*img.get_pixel(10, 30), BOX_COLOR);
        assert_eq!(*img.get_pixel(11, 31), BOX_COLOR);
        assert_eq!(*img.get_pixel(49, 69), BOX_COLOR);
        assert_eq!(*img.get_pixel(30, 30), BOX_COLOR);
        // 框内部与框外不变
        assert_eq!(*img.get_pixel(12, 32), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(30, 50), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_one_box_per_object() {
        let mut img = RgbImage::new(200, 200);
        let objects = vec![
            object("bus", Bbox::from_xyxy(10., 10., 60., 60., 5, 0.8)),
            object("person", Bbox::from_xyxy(100., 100., 150., 190., 0, 0.7)),
        ];
        let annotated = Annotator::new(None).with_thickness(1).draw(&mut img, &objects);
        assert_eq!(annotated.boxes, 2);
        assert_eq!(*img.get_pixel(100, 150), BOX_COLOR);
        assert_eq!(*img.get_pixel(101, 150), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_zero_width_box_is_drawn_as_line() {
        let mut img = RgbImage::new(50, 50);
        let objects = vec![object("car", Bbox::from_xyxy(20., 20., 20., 30., 2, 0.9))];
        let annotated = Annotator::new(None).draw(&mut img, &objects);
        assert_eq!(annotated.boxes, 1);
        assert_eq!(*img.get_pixel(20, 20), BOX_COLOR);
        assert_eq!(*img.get_pixel(20, 29), BOX_COLOR);
        assert_eq!(*img.get_pixel(21, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_edges_at_image_border() {
        // 贴着右下边界裁剪后高度为 0
        let mut img = RgbImage::new(40, 40);
        let objects = vec![object("bus", Bbox::from_xyxy(10., 39., 30., 39., 5, 0.7))];
        let annotated = Annotator::new(None).draw(&mut img, &objects);
        assert_eq!(annotated.boxes, 1);
        assert_eq!(*img.get_pixel(10, 39), BOX_COLOR);
        assert_eq!(*img.get_pixel(29, 39), BOX_COLOR);
    }

    #[test]
    fn test_corners_are_truncated() {
        let mut img = RgbImage::new(60, 60);
        let objects = vec![object("car", Bbox::from_xyxy(10.8, 10.9, 40.7, 40.6, 2, 0.9))];
        Annotator::new(None).with_thickness(1).draw(&mut img, &objects);
        assert_eq!(*img.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*img.get_pixel(39, 39), BOX_COLOR);
        assert_ne!(*img.get_pixel(11, 11), BOX_COLOR);
        assert_ne!(*img.get_pixel(40, 40), BOX_COLOR);
    }

    #[test]
    fn test_nothing_to_draw() {
        let mut img = RgbImage::new(10, 10);
        let annotated = Annotator::new(None).draw(&mut img, &[]);
        assert_eq!(annotated, Annotated::default());
    }
}
