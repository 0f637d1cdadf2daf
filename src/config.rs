// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::Parser;

use crate::weights::DEFAULT_WEIGHTS_URL;

/// 命令行参数 (模型 / 推理 / 输出)
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Traffic object detection with YOLOv8 + ONNX Runtime", long_about = None)]
pub struct Args {
    /// ONNX model path (or an official asset name such as `yolov8n.onnx`)
    #[arg(long, default_value_t = String::from("yolov8n.onnx"))]
    pub model: String,

    /// input path or http(s) url
    #[arg(long, default_value_t = String::from("https://ultralytics.com/images/bus.jpg"))]
    pub source: String,

    /// device id
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// using TensorRT EP
    #[arg(long)]
    pub trt: bool,

    /// using CUDA EP
    #[arg(long)]
    pub cuda: bool,

    /// input batch size
    #[arg(long, default_value_t = 1)]
    pub batch: u32,

    /// trt input min_batch size
    #[arg(long, default_value_t = 1)]
    pub batch_min: u32,

    /// trt input max_batch size
    #[arg(long, default_value_t = 32)]
    pub batch_max: u32,

    /// trt fp16
    #[arg(long)]
    pub fp16: bool,

    /// num_classes
    #[arg(long)]
    pub nc: Option<u32>,

    /// input image width
    #[arg(long)]
    pub width: Option<u32>,

    /// input image height
    #[arg(long)]
    pub height: Option<u32>,

    /// confidence threshold
    #[arg(long, required = false, default_value_t = 0.25)]
    pub conf: f32,

    /// iou threshold in NMS
    #[arg(long, required = false, default_value_t = 0.7)]
    pub iou: f32,

    /// maximum detections kept per image
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// class-agnostic NMS
    #[arg(long)]
    pub agnostic: bool,

    /// profile
    #[arg(long)]
    pub profile: bool,

    /// do not open the result window
    #[arg(long)]
    pub nosh: bool,

    /// save the annotated image
    #[arg(long)]
    pub save: bool,

    /// directory for saved results
    #[arg(long, default_value_t = String::from("runs/traffic"))]
    pub save_dir: String,

    /// also write the detections as json (requires --save)
    #[arg(long)]
    pub json: bool,

    /// label font
    #[arg(long, default_value_t = String::from("Arial.ttf"))]
    pub font: String,

    /// base url for downloading official weights
    #[arg(long, default_value_t = String::from(DEFAULT_WEIGHTS_URL))]
    pub weights_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["traffic_detect"]).unwrap();
        assert_eq!(args.model, "yolov8n.onnx");
        assert_eq!(args.source, "https://ultralytics.com/images/bus.jpg");
        assert_eq!(args.batch, 1);
        assert!((args.conf - 0.25).abs() < 1e-6);
        assert!((args.iou - 0.7).abs() < 1e-6);
        assert_eq!(args.max_det, 300);
        assert!(!args.nosh && !args.save && !args.cuda && !args.trt);
        assert!(args.width.is_none() && args.height.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "traffic_detect",
            "--model",
            "weights/yolov8s.onnx",
            "--source",
            "street.jpg",
            "--conf",
            "0.4",
            "--width",
            "480",
            "--nosh",
            "--save",
        ])
        .unwrap();
        assert_eq!(args.model, "weights/yolov8s.onnx");
        assert_eq!(args.source, "street.jpg");
        assert!((args.conf - 0.4).abs() < 1e-6);
        assert_eq!(args.width, Some(480));
        assert!(args.nosh);
        assert!(args.save);
    }
}
