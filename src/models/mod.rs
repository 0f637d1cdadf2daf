/// 模型统一接口与实现
///
/// ## Model Trait
/// 统一的模型接口, 定义标准流程: preprocess → run → postprocess
///
/// ## 使用示例
/// ```no_run
/// use traffic_detect::models::{Model, YOLOv8};
/// use traffic_detect::Args;
/// use clap::Parser;
///
/// # fn main() -> anyhow::Result<()> {
/// let args = Args::parse();
/// let mut model = YOLOv8::new(&args)?;
/// let image = image::open("bus.jpg")?;
/// let results = model.forward(&[image])?;
/// # Ok(())
/// # }
/// ```
use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::DetectionResult;

/// 统一的检测模型接口
///
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 推理: 执行模型前向传播, 返回原始输出(未解码)
    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测结果 (坐标还原到原图)
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[DynamicImage]) -> Result<Vec<DetectionResult>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs, false)?;
        self.postprocess(ys, images)
    }

    /// 类别名称, 下标即类别 id
    fn names(&self) -> &[String];

    /// 打印模型信息
    fn summary(&self);
}

pub mod yolov8; // YOLOv8 完整模型 + 实现 Model trait

pub use yolov8::{YOLOv8, YOLOv8Config, YOLOv8Postprocessor};
