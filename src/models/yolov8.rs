// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理、推理、后处理

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, Axis, IxDyn};

use crate::ort_backend::COCO_NAMES;
use crate::{
    non_max_suppression, weights, Args, Batch, Bbox, DetectionResult, OrtBackend, OrtConfig,
    OrtEP, YOLOTask,
};

/// letterbox 填充灰度 (114/255)
const PAD_VALUE: f32 = 114.0 / 255.0;

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    postprocessor: YOLOv8Postprocessor,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv8 {
    /// 从命令行参数创建 YOLOv8 模型
    pub fn new(config: &Args) -> Result<Self> {
        // weights
        let f = weights::resolve(&config.model, &config.weights_url)?;

        // execution provider
        let ep = if config.trt {
            OrtEP::Trt(config.device_id)
        } else if config.cuda {
            OrtEP::CUDA(config.device_id)
        } else {
            OrtEP::CPU
        };

        // batch
        let batch = Batch {
            opt: config.batch,
            min: config.batch_min,
            max: config.batch_max,
        };

        // build ort engine
        let ort_args = OrtConfig {
            f: f.clone(),
            ep,
            batch,
            trt_fp16: config.fp16,
            image_size: (config.height, config.width),
        };
        let engine = OrtBackend::build(ort_args)
            .with_context(|| format!("failed to build session from {}", f.display()))?;

        if let Some(task) = engine.task() {
            if task != YOLOTask::Detect {
                bail!("{} is a {:?} model, only Detect is supported", f.display(), task);
            }
        }

        let Some(nc) = engine.nc().or(config.nc) else {
            bail!("Failed to get num_classes, make it explicit with `--nc`");
        };

        // class names
        let names = match engine.names() {
            Some(names) if names.len() == nc as usize => names,
            _ if nc as usize == COCO_NAMES.len() => {
                COCO_NAMES.iter().map(|s| s.to_string()).collect()
            }
            _ => (0..nc).map(|i| format!("class{i}")).collect(),
        };

        let postprocessor = YOLOv8Postprocessor::new(YOLOv8Config {
            nc: nc as usize,
            width: engine.width() as usize,
            height: engine.height() as usize,
            conf: config.conf,
            iou: config.iou,
            max_det: config.max_det,
            agnostic: config.agnostic,
        });

        Ok(Self {
            engine,
            postprocessor,
            names,
            profile: config.profile,
        })
    }

    pub fn preprocess(&self, xs: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        let (height, width) = (self.height() as usize, self.width() as usize);
        let mut ys = Array::from_elem((xs.len(), 3, height, width), PAD_VALUE).into_dyn();
        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            let (_, w_new, h_new) =
                scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
            let img = x.resize_exact(
                (w_new as u32).max(1),
                (h_new as u32).max(1),
                image::imageops::FilterType::Triangle,
            );

            for (x, y, rgb) in img.pixels() {
                let x = x as usize;
                let y = y as usize;
                let [r, g, b, _] = rgb.0;
                ys[[idx, 0, y, x]] = (r as f32) / 255.0;
                ys[[idx, 1, y, x]] = (g as f32) / 255.0;
                ys[[idx, 2, y, x]] = (b as f32) / 255.0;
            }
        }

        Ok(ys)
    }

    pub fn summary(&self) {
        println!(
            "\nSummary:\n\
            > Task: Detect{}\n\
            > EP: {:?} {}\n\
            > Dtype: {:?}\n\
            > Batch: {} ({}), Height: {} ({}), Width: {} ({})\n\
            > nc: {}, conf: {}, iou: {}, max_det: {}\n\
            ",
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!(" ({} {})", author, ver),
                None => String::from(""),
            },
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.engine.dtype(),
            self.engine.batch(),
            if self.engine.is_batch_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.height(),
            if self.engine.is_height_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.width(),
            if self.engine.is_width_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.postprocessor.config.nc,
            self.postprocessor.config.conf,
            self.postprocessor.config.iou,
            self.postprocessor.config.max_det,
        );
    }

    pub fn width(&self) -> u32 {
        self.engine.width()
    }

    pub fn height(&self) -> u32 {
        self.engine.height()
    }
}

impl super::Model for YOLOv8 {
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let batch = YOLOv8::preprocess(self, images)?;
        if self.profile {
            log::info!("[Model Preprocess]: {:?}", t.elapsed());
        }
        Ok(vec![batch])
    }

    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let profile = profile || self.profile;
        let mut ys = Vec::new();
        for x in xs {
            ys.extend(self.engine.run(x, profile)?);
        }
        Ok(ys)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        let t = std::time::Instant::now();
        let ys = self.postprocessor.postprocess(xs, xs0)?;
        if self.profile {
            log::info!("[Model Postprocess]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        YOLOv8::summary(self)
    }
}

/// 等比缩放: 返回 (比例, 新宽, 新高)
fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// YOLOv8 后处理配置
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub nc: usize,
    pub width: usize,
    pub height: usize,
    pub conf: f32,
    pub iou: f32,
    pub max_det: usize,
    pub agnostic: bool,
}

impl YOLOv8Config {
    pub fn new(nc: usize, width: usize, height: usize, conf: f32, iou: f32) -> Self {
        Self {
            nc,
            width,
            height,
            conf,
            iou,
            max_det: 300,
            agnostic: false,
        }
    }
}

/// YOLOv8 检测头后处理器
///
/// 输入 `[batch, 4 + nc, anchors]`, 每个 anchor 为 `cx, cy, w, h, cls0..clsN`,
/// 坐标相对于左上角对齐的 letterbox 输入
pub struct YOLOv8Postprocessor {
    config: YOLOv8Config,
}

impl YOLOv8Postprocessor {
    pub fn new(config: YOLOv8Config) -> Self {
        Self { config }
    }

    pub fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        const CXYWH_OFFSET: usize = 4;

        let Some(preds) = xs.first() else {
            bail!("model produced no outputs");
        };
        if preds.ndim() != 3 || preds.shape()[1] < CXYWH_OFFSET + self.config.nc {
            bail!(
                "unexpected output shape {:?} for nc = {}",
                preds.shape(),
                self.config.nc
            );
        }
        if preds.shape()[0] < xs0.len() {
            bail!(
                "output batch {} is smaller than input batch {}",
                preds.shape()[0],
                xs0.len()
            );
        }

        let mut ys = Vec::new();
        for (idx, anchor) in preds.axis_iter(Axis(0)).take(xs0.len()).enumerate() {
            let width_original = xs0[idx].width() as f32;
            let height_original = xs0[idx].height() as f32;
            let ratio = (self.config.width as f32 / width_original)
                .min(self.config.height as f32 / height_original);

            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + self.config.nc]);

                let Some((id, &confidence)) = clss
                    .into_iter()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max })
                else {
                    continue;
                };

                if confidence < self.config.conf {
                    continue;
                }

                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                data.push(Bbox::from_xyxy(
                    (cx - w / 2.).clamp(0., width_original),
                    (cy - h / 2.).clamp(0., height_original),
                    (cx + w / 2.).clamp(0., width_original),
                    (cy + h / 2.).clamp(0., height_original),
                    id,
                    confidence,
                ));
            }

            non_max_suppression(&mut data, self.config.iou, self.config.agnostic);
            data.truncate(self.config.max_det);

            ys.push(DetectionResult::new(if data.is_empty() {
                None
            } else {
                Some(data)
            }));
        }

        Ok(ys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 `[1, 4 + nc, anchors]` 输出
    fn output(nc: usize, anchors: &[([f32; 4], usize, f32)]) -> Array<f32, IxDyn> {
        let mut ys = Array::zeros((1, 4 + nc, anchors.len())).into_dyn();
        for (i, (cxcywh, cls, score)) in anchors.iter().enumerate() {
            for (k, v) in cxcywh.iter().enumerate() {
                ys[[0, k, i]] = *v;
            }
            ys[[0, 4 + cls, i]] = *score;
        }
        ys
    }

    #[test]
    fn test_scale_wh() {
        let (r, w, h) = scale_wh(1280., 720., 640., 640.);
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!((w, h), (640., 360.));
    }

    #[test]
    fn test_postprocess_maps_to_original_pixels() {
        let pp = YOLOv8Postprocessor::new(YOLOv8Config::new(3, 640, 640, 0.25, 0.7));
        // 1280x720 原图, ratio = 0.5
        let img = DynamicImage::new_rgb8(1280, 720);
        let xs = output(3, &[([100., 100., 40., 20.], 2, 0.9)]);

        let ys = pp.postprocess(vec![xs], &[img]).unwrap();
        let bboxes = ys[0].bboxes().unwrap();
        assert_eq!(bboxes.len(), 1);
        let b = &bboxes[0];
        assert_eq!(b.id(), 2);
        assert!((b.xmin() - 160.).abs() < 1e-3);
        assert!((b.ymin() - 180.).abs() < 1e-3);
        assert!((b.xmax() - 240.).abs() < 1e-3);
        assert!((b.ymax() - 220.).abs() < 1e-3);
    }

    #[test]
    fn test_postprocess_thresholds_and_nms() {
        let pp = YOLOv8Postprocessor::new(YOLOv8Config::new(2, 640, 640, 0.25, 0.7));
        let img = DynamicImage::new_rgb8(640, 640);
        let xs = output(
            2,
            &[
                ([100., 100., 50., 50.], 0, 0.9),
                ([101., 101., 50., 50.], 0, 0.8), // 与第一个重叠, 被抑制
                ([400., 400., 50., 50.], 1, 0.1), // 低于阈值
                ([300., 300., 50., 50.], 1, 0.5),
            ],
        );

        let ys = pp.postprocess(vec![xs], &[img]).unwrap();
        let bboxes = ys[0].bboxes().unwrap();
        assert_eq!(bboxes.len(), 2);
        assert_eq!(bboxes[0].confidence(), 0.9);
        assert_eq!(bboxes[1].id(), 1);
    }

    #[test]
    fn test_postprocess_clips_to_image() {
        let pp = YOLOv8Postprocessor::new(YOLOv8Config::new(1, 640, 640, 0.25, 0.7));
        let img = DynamicImage::new_rgb8(640, 640);
        let xs = output(1, &[([5., 630., 40., 40.], 0, 0.6)]);

        let ys = pp.postprocess(vec![xs], &[img]).unwrap();
        let b = &ys[0].bboxes().unwrap()[0];
        assert_eq!(b.xmin(), 0.);
        assert_eq!(b.ymax(), 640.);
    }

    #[test]
    fn test_postprocess_empty_and_bad_shape() {
        let pp = YOLOv8Postprocessor::new(YOLOv8Config::new(2, 640, 640, 0.25, 0.7));
        let img = DynamicImage::new_rgb8(64, 64);
        let xs = output(2, &[([10., 10., 5., 5.], 0, 0.1)]);
        let ys = pp.postprocess(vec![xs], &[img.clone()]).unwrap();
        assert!(ys[0].bboxes().is_none());

        let bad = Array::zeros((1, 3, 10)).into_dyn();
        assert!(pp.postprocess(vec![bad], &[img]).is_err());
    }
}
