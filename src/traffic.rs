// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 交通相关类别过滤 + 文本报告

use std::io::Write;

use serde::Serialize;

use crate::{Bbox, DetectionResult};

/// 关注的交通类别 (COCO 名称, 区分大小写)
pub const TRAFFIC_CLASSES: [&str; 10] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "traffic light",
    "stop sign",
];

pub fn is_traffic_class(name: &str) -> bool {
    TRAFFIC_CLASSES.contains(&name)
}

/// 首字母大写, 其余小写: "traffic light" → "Traffic light"
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// 按精确值保留两位小数 (与标签的 `{:.2}` 一致), 去掉多余的 0: 0.90 → "0.9"
pub fn round_confidence(confidence: f32) -> String {
    let s = format!("{:.2}", confidence);
    match s.trim_end_matches('0') {
        t if t.ends_with('.') => format!("{t}0"),
        t => t.to_string(),
    }
}

/// 一个保留下来的交通目标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficObject {
    pub name: String,
    pub confidence: f32,
    pub bbox: Bbox,
}

impl TrafficObject {
    /// 绘制在图上的标签: `Car: 0.87`
    pub fn label(&self) -> String {
        format!("{}: {:.2}", capitalize(&self.name), self.confidence)
    }
}

/// 类别白名单过滤
#[derive(Debug, Clone, Copy, Default)]
pub struct TrafficFilter;

impl TrafficFilter {
    pub fn new() -> Self {
        Self
    }

    /// 按模型输出顺序保留白名单中的检测框; 越界的类别 id 直接丢弃
    pub fn apply(&self, result: &DetectionResult, names: &[String]) -> Vec<TrafficObject> {
        let Some(bboxes) = result.bboxes() else {
            return Vec::new();
        };
        bboxes
            .iter()
            .filter_map(|bbox| {
                let name = names.get(bbox.id())?;
                if !is_traffic_class(name) {
                    return None;
                }
                Some(TrafficObject {
                    name: name.clone(),
                    confidence: bbox.confidence(),
                    bbox: bbox.clone(),
                })
            })
            .collect()
    }
}

/// 输出检测结果列表
pub fn write_report<W: Write>(w: &mut W, objects: &[TrafficObject]) -> std::io::Result<()> {
    writeln!(w, "\nDetected Objects:")?;
    for obj in objects {
        writeln!(
            w,
            "  - {} (Confidence: {})",
            capitalize(&obj.name),
            round_confidence(obj.confidence)
        )?;
    }
    Ok(())
}
