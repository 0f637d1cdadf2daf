// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 交通目标检测流程: 加载模型 → 推理 → 类别过滤 → 绘制 → 显示 (→ 保存)

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Serialize;

use crate::annotate::Annotator;
use crate::models::{Model, YOLOv8};
use crate::source::load_image;
use crate::traffic::{write_report, TrafficFilter, TrafficObject};
use crate::utils::gen_time_string;
use crate::viewer::{NoopViewer, Viewer, WindowViewer, WINDOW_TITLE};
use crate::Args;

/// 一次检测的结果
pub struct TrafficReport {
    pub source: String,
    pub objects: Vec<TrafficObject>,
    pub annotated: RgbImage,
    /// 保存的图片路径 (`--save`)
    pub saved: Option<PathBuf>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    source: &'a str,
    width: u32,
    height: u32,
    objects: &'a [TrafficObject],
}

pub struct TrafficInspector<V: Viewer> {
    viewer: V,
    filter: TrafficFilter,
    font: Option<String>,
    annotator: Option<Annotator>,
    save_dir: Option<PathBuf>,
    json: bool,
    profile: bool,
}

impl<V: Viewer> TrafficInspector<V> {
    pub fn new(viewer: V) -> Self {
        Self {
            viewer,
            filter: TrafficFilter::new(),
            font: None,
            annotator: None,
            save_dir: None,
            json: false,
            profile: false,
        }
    }

    /// 标签字体, 首次绘制时加载
    pub fn with_font(mut self, font: &str) -> Self {
        self.font = Some(font.to_string());
        self
    }

    /// 直接指定绘制器 (不加载字体)
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>, json: bool) -> Self {
        self.save_dir = Some(dir.into());
        self.json = json;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    /// 检测并把文本结果写到 stdout
    pub fn inspect<M, L>(&mut self, source: &str, load_model: L) -> Option<TrafficReport>
    where
        M: Model,
        L: FnOnce() -> Result<M>,
    {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.inspect_to(&mut out, source, load_model)
    }

    /// 模型加载或推理失败时输出错误并返回 `None`, 不显示窗口
    pub fn inspect_to<W, M, L>(
        &mut self,
        out: &mut W,
        source: &str,
        load_model: L,
    ) -> Option<TrafficReport>
    where
        W: Write,
        M: Model,
        L: FnOnce() -> Result<M>,
    {
        let mut model = match load_model() {
            Ok(model) => model,
            Err(e) => {
                log::error!("model load failed: {e:?}");
                writeln!(out, "Error loading model: {e:#}").ok();
                return None;
            }
        };
        if self.profile {
            model.summary();
        }

        writeln!(out, "Running detection on {source}...").ok();
        let t = std::time::Instant::now();
        let (loaded, result) = match Self::infer(&mut model, source) {
            Ok(r) => r,
            Err(e) => {
                log::error!("inference failed: {e:?}");
                writeln!(out, "Error running inference: {e:#}").ok();
                return None;
            }
        };
        log::info!("Inference on {source} took {:?}", t.elapsed());

        let objects = self.filter.apply(&result, model.names());
        write_report(out, &objects).ok();

        let mut annotated = loaded.image.into_rgb8();
        let drawn = self.annotator().draw(&mut annotated, &objects);
        log::debug!("Drew {} boxes and {} labels", drawn.boxes, drawn.labels);

        let saved = match self.save_dir.clone() {
            Some(dir) => match self.save(&dir, &loaded.stem, source, &annotated, &objects) {
                Ok(path) => {
                    writeln!(out, "Results saved to {}", path.display()).ok();
                    Some(path)
                }
                Err(e) => {
                    log::warn!("Failed to save results: {e:#}");
                    None
                }
            },
            None => None,
        };

        if let Err(e) = self.viewer.show(WINDOW_TITLE, &annotated) {
            log::warn!("Failed to display result: {e:#}");
        }

        Some(TrafficReport {
            source: source.to_string(),
            objects,
            annotated,
            saved,
        })
    }

    fn infer<M: Model>(
        model: &mut M,
        source: &str,
    ) -> Result<(crate::source::LoadedImage, crate::DetectionResult)> {
        let loaded = load_image(source)?;
        let result = model
            .forward(std::slice::from_ref(&loaded.image))?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok((loaded, result))
    }

    fn annotator(&mut self) -> &Annotator {
        let font = self.font.clone();
        self.annotator.get_or_insert_with(|| match font {
            Some(font) => Annotator::with_font_name(&font),
            None => Annotator::new(None),
        })
    }

    fn save(
        &self,
        dir: &Path,
        stem: &str,
        source: &str,
        annotated: &RgbImage,
        objects: &[TrafficObject],
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let name = format!("{}-{}", stem, gen_time_string("-"));

        let path = dir.join(format!("{name}.jpg"));
        annotated
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        if self.json {
            let json_path = dir.join(format!("{name}.json"));
            let report = JsonReport {
                source,
                width: annotated.width(),
                height: annotated.height(),
                objects,
            };
            let f = std::fs::File::create(&json_path)
                .with_context(|| format!("failed to create {}", json_path.display()))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(f), &report)?;
        }
        Ok(path)
    }
}

/// 命令行入口: YOLOv8 + 结果窗口 (`--nosh` 时不显示)
pub fn detect_traffic_objects(args: &Args) -> Option<TrafficReport> {
    if args.nosh {
        run_with(TrafficInspector::new(NoopViewer), args)
    } else {
        run_with(TrafficInspector::new(WindowViewer::new()), args)
    }
}

fn run_with<V: Viewer>(inspector: TrafficInspector<V>, args: &Args) -> Option<TrafficReport> {
    let mut inspector = inspector.with_font(&args.font).with_profile(args.profile);
    if args.save {
        inspector = inspector.with_save_dir(&args.save_dir, args.json);
    }
    inspector.inspect(&args.source, || YOLOv8::new(args))
}
