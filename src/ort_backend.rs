// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 负责: 创建会话、选择执行器(EP)、读取模型元数据、执行推理

use std::path::PathBuf;

use anyhow::{bail, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::Tensor;
use regex::Regex;

/// COCO 80 类名称 (模型未携带 names 元数据时使用)
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// 推理任务类型 (来自模型元数据 `task`)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum YOLOTask {
    Classify,
    Detect,
    Pose,
    Segment,
}

impl YOLOTask {
    pub fn from_metadata(s: &str) -> Option<Self> {
        match s.trim() {
            "classify" => Some(Self::Classify),
            "detect" => Some(Self::Detect),
            "pose" => Some(Self::Pose),
            "segment" => Some(Self::Segment),
            _ => None,
        }
    }
}

/// 执行器 (Execution Provider)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 批大小 (TensorRT 动态 profile 使用 min/opt/max)
#[derive(Debug, Copy, Clone)]
pub struct Batch {
    pub opt: u32,
    pub min: u32,
    pub max: u32,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            opt: 1,
            min: 1,
            max: 1,
        }
    }
}

/// 后端配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    pub batch: Batch,
    /// (height, width), 仅在模型输入为动态尺寸时生效
    pub image_size: (Option<u32>, Option<u32>),
}

/// ONNX Runtime 会话封装
pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    dtype: TensorElementType,
    batch: u32,
    height: u32,
    width: u32,
    dynamic: [bool; 3],
    output_names: Vec<String>,
    output_shapes: Vec<Vec<i64>>,
    task: Option<YOLOTask>,
    names: Option<Vec<String>>,
    author: Option<String>,
    version: Option<String>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let (session, ep) = Self::build_session(&args)?;

        // input: dtype + NCHW shape
        let Some(input) = session.inputs.first() else {
            bail!("model {} has no inputs", args.f.display());
        };
        let dtype = input
            .input_type
            .tensor_type()
            .unwrap_or(TensorElementType::Float32);
        if !matches!(dtype, TensorElementType::Float32 | TensorElementType::Float16) {
            bail!("unsupported input dtype {:?}", dtype);
        }
        let shape: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        if shape.len() != 4 {
            bail!("expected NCHW input, got shape {:?}", shape);
        }

        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        let output_shapes = session
            .outputs
            .iter()
            .map(|o| {
                o.output_type
                    .tensor_shape()
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default()
            })
            .collect();

        // metadata
        let (task, names, author, version, imgsz) = match session.metadata() {
            Ok(meta) => {
                let custom = |key: &str| meta.custom(key).ok().flatten();
                (
                    custom("task").and_then(|s| YOLOTask::from_metadata(&s)),
                    custom("names").map(|s| Self::parse_names(&s)),
                    custom("author"),
                    custom("version"),
                    custom("imgsz").and_then(|s| Self::parse_imgsz(&s)),
                )
            }
            Err(e) => {
                log::warn!("Failed to read model metadata: {e}");
                (None, None, None, None, None)
            }
        };

        // batch, height, width: 静态维度以模型为准, 动态维度依次取 参数 → imgsz → 640
        let dynamic = [shape[0] <= 0, shape[2] <= 0, shape[3] <= 0];
        let batch = if dynamic[0] {
            args.batch.opt
        } else {
            shape[0] as u32
        };
        let (height, width) = Self::resolve_hw(&shape, args.image_size, imgsz);

        Ok(Self {
            session,
            ep,
            dtype,
            batch,
            height,
            width,
            dynamic,
            output_names,
            output_shapes,
            task,
            names,
            author,
            version,
        })
    }

    fn build_session(args: &OrtConfig) -> ort::Result<(Session, OrtEP)> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        let ep = match args.ep {
            OrtEP::Trt(device_id) => {
                let (name, height, width) = Self::input_layout(args)?;
                let shape = |batch| Self::profile_shape(&name, batch, height, width);
                let trt = TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .with_fp16(args.trt_fp16)
                    .with_engine_cache(true)
                    .with_engine_cache_path("./trt_engine_cache")
                    .with_profile_min_shapes(shape(args.batch.min))
                    .with_profile_opt_shapes(shape(args.batch.opt))
                    .with_profile_max_shapes(shape(args.batch.max));
                if trt.is_available()? {
                    builder = builder.with_execution_providers([trt.build()])?;
                    args.ep
                } else {
                    log::warn!("TensorRT EP is not available, falling back to CPU");
                    OrtEP::CPU
                }
            }
            OrtEP::CUDA(device_id) => {
                let cuda = CUDAExecutionProvider::default().with_device_id(device_id);
                if cuda.is_available()? {
                    builder = builder.with_execution_providers([cuda.build()])?;
                    args.ep
                } else {
                    log::warn!("CUDA EP is not available, falling back to CPU");
                    OrtEP::CPU
                }
            }
            OrtEP::CPU => OrtEP::CPU,
        };
        if ep == OrtEP::CPU {
            builder = builder.with_execution_providers([CPUExecutionProvider::default().build()])?;
        }

        let session = builder.commit_from_file(&args.f)?;
        Ok((session, ep))
    }

    /// TensorRT profile 要在建会话前确定输入名和 H/W, 先用默认 EP 读一遍模型
    fn input_layout(args: &OrtConfig) -> ort::Result<(String, u32, u32)> {
        let session = Session::builder()?.commit_from_file(&args.f)?;
        let input = session.inputs.first();
        let name = input
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());
        let shape: Vec<i64> = input
            .and_then(|i| i.input_type.tensor_shape())
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        let imgsz = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom("imgsz").ok().flatten())
            .and_then(|s| Self::parse_imgsz(&s));
        let (height, width) = Self::resolve_hw(&shape, args.image_size, imgsz);
        Ok((name, height, width))
    }

    /// 静态维度以模型为准, 动态维度依次取 参数 → imgsz → 640
    fn resolve_hw(
        shape: &[i64],
        image_size: (Option<u32>, Option<u32>),
        imgsz: Option<(u32, u32)>,
    ) -> (u32, u32) {
        let dim = |i: usize, arg: Option<u32>, meta: Option<u32>| match shape.get(i) {
            Some(&d) if d > 0 => d as u32,
            _ => arg.or(meta).unwrap_or(640),
        };
        (
            dim(2, image_size.0, imgsz.map(|(h, _)| h)),
            dim(3, image_size.1, imgsz.map(|(_, w)| w)),
        )
    }

    /// `images:4x3x480x640`
    fn profile_shape(name: &str, batch: u32, height: u32, width: u32) -> String {
        format!("{name}:{batch}x3x{height}x{width}")
    }

    /// 解析 Ultralytics 导出的 names 元数据: `{0: 'person', 1: 'bicycle', ...}`
    pub fn parse_names(s: &str) -> Vec<String> {
        let Ok(re) = Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#) else {
            return Vec::new();
        };
        let mut pairs: Vec<(usize, String)> = re
            .captures_iter(s)
            .filter_map(|caps| {
                let id = caps.get(1)?.as_str().parse::<usize>().ok()?;
                Some((id, caps.get(2)?.as_str().to_string()))
            })
            .collect();
        pairs.sort_by_key(|(id, _)| *id);
        pairs.into_iter().map(|(_, name)| name).collect()
    }

    /// `[640, 640]` → (h, w)
    fn parse_imgsz(s: &str) -> Option<(u32, u32)> {
        let nums: Vec<u32> = s
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .filter_map(|x| x.trim().parse().ok())
            .collect();
        match nums.as_slice() {
            [h, w] => Some((*h, *w)),
            [s] => Some((*s, *s)),
            _ => None,
        }
    }

    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let outputs = match self.dtype {
            TensorElementType::Float16 => {
                let input = Tensor::from_array(xs.mapv(half::f16::from_f32))?;
                self.session.run(ort::inputs![input])?
            }
            _ => {
                let input = Tensor::from_array(xs)?;
                self.session.run(ort::inputs![input])?
            }
        };
        if profile {
            log::info!("[ORT Inference]: {:?}", t.elapsed());
        }

        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in self.output_names.iter() {
            let value = &outputs[name.as_str()];
            let y = match self.dtype {
                TensorElementType::Float16 => value
                    .try_extract_array::<half::f16>()?
                    .mapv(half::f16::to_f32),
                _ => value.try_extract_array::<f32>()?.into_owned(),
            };
            ys.push(y);
        }
        Ok(ys)
    }

    /// 类别数: 优先从输出形状 `[b, 4 + nc, anchors]` 推断, 否则取 names 长度
    pub fn nc(&self) -> Option<u32> {
        match self.output_shapes.first().map(|s| s.as_slice()) {
            Some([_, c, _]) if *c > 4 => Some((*c - 4) as u32),
            _ => self.names.as_ref().map(|n| n.len() as u32),
        }
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn task(&self) -> Option<YOLOTask> {
        self.task
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn dtype(&self) -> TensorElementType {
        self.dtype
    }

    pub fn batch(&self) -> u32 {
        self.batch
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_batch_dynamic(&self) -> bool {
        self.dynamic[0]
    }

    pub fn is_height_dynamic(&self) -> bool {
        self.dynamic[1]
    }

    pub fn is_width_dynamic(&self) -> bool {
        self.dynamic[2]
    }

    pub fn author(&self) -> Option<&String> {
        self.author.as_ref()
    }

    pub fn version(&self) -> Option<&String> {
        self.version.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        let names = OrtBackend::parse_names("{0: 'person', 2: 'car', 1: 'bicycle', 9: 'traffic light'}");
        assert_eq!(names, vec!["person", "bicycle", "car", "traffic light"]);
    }

    #[test]
    fn test_parse_names_double_quotes() {
        let names = OrtBackend::parse_names(r#"{0: "stop sign", 1: "bus"}"#);
        assert_eq!(names, vec!["stop sign", "bus"]);
    }

    #[test]
    fn test_parse_imgsz() {
        assert_eq!(OrtBackend::parse_imgsz("[640, 640]"), Some((640, 640)));
        assert_eq!(OrtBackend::parse_imgsz("[480, 640]"), Some((480, 640)));
        assert_eq!(OrtBackend::parse_imgsz("320"), Some((320, 320)));
        assert_eq!(OrtBackend::parse_imgsz("nope"), None);
    }

    #[test]
    fn test_resolve_hw() {
        // 静态输入
        assert_eq!(
            OrtBackend::resolve_hw(&[1, 3, 480, 640], (Some(320), Some(320)), None),
            (480, 640)
        );
        // 动态输入: 参数优先, 其次 imgsz, 最后 640
        let dynamic = [-1, 3, -1, -1];
        assert_eq!(
            OrtBackend::resolve_hw(&dynamic, (Some(384), Some(512)), Some((320, 320))),
            (384, 512)
        );
        assert_eq!(
            OrtBackend::resolve_hw(&dynamic, (None, Some(512)), Some((320, 416))),
            (320, 512)
        );
        assert_eq!(OrtBackend::resolve_hw(&dynamic, (None, None), None), (640, 640));
    }

    #[test]
    fn test_trt_profile_shape() {
        assert_eq!(OrtBackend::profile_shape("images", 4, 384, 512), "images:4x3x384x512");
        assert_eq!(OrtBackend::profile_shape("input", 1, 640, 640), "input:1x3x640x640");
    }

    #[test]
    fn test_task_from_metadata() {
        assert_eq!(YOLOTask::from_metadata("detect"), Some(YOLOTask::Detect));
        assert_eq!(YOLOTask::from_metadata("segment"), Some(YOLOTask::Segment));
        assert_eq!(YOLOTask::from_metadata("obb"), None);
    }

    #[test]
    fn test_coco_traffic_ids() {
        assert_eq!(COCO_NAMES[0], "person");
        assert_eq!(COCO_NAMES[9], "traffic light");
        assert_eq!(COCO_NAMES[11], "stop sign");
    }
}
