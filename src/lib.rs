#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 检测框/标签绘制
pub mod assets; // 字体资源
pub mod config; // 命令行参数
pub mod models; // 模型接口与具体实现
pub mod ort_backend;
pub mod pipeline; // 加载 → 推理 → 过滤 → 绘制 → 显示
pub mod source; // 输入图片 (本地路径 / URL)
pub mod traffic; // 交通类别过滤
pub mod utils;
pub mod viewer; // 结果窗口
pub mod weights; // 模型权重定位/下载

pub use crate::config::Args;
pub use crate::models::{Model, YOLOv8, YOLOv8Config, YOLOv8Postprocessor};
pub use crate::ort_backend::{Batch, OrtBackend, OrtConfig, OrtEP, YOLOTask};
pub use crate::pipeline::{detect_traffic_objects, TrafficInspector, TrafficReport};
pub use crate::traffic::{TrafficFilter, TrafficObject, TRAFFIC_CLASSES};
pub use crate::viewer::{Viewer, WindowViewer};

use serde::Serialize;

/// 非极大值抑制
///
/// `agnostic == false` 时只在同类别的框之间抑制
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32, agnostic: bool) {
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if !agnostic && xs[prev_index].id() != xs[index].id() {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct DetectionResult {
    // detection results of an image
    pub bboxes: Option<Vec<Bbox>>,
}

impl DetectionResult {
    pub fn new(bboxes: Option<Vec<Bbox>>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> Option<&Vec<Bbox>> {
        self.bboxes.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    /// 由左上/右下角点构造
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, (x2 - x1).max(0.), (y2 - y1).max(0.), id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}
