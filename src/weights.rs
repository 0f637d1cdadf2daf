// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 模型权重定位: 本地路径 → 缓存目录 → 官方发布资源下载

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use regex::Regex;

use crate::utils::download;

/// 官方权重下载地址 (GitHub release assets)
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0";

/// 是否是官方发布的检测权重文件名, 例如 `yolov8n.onnx`, `yolo11s.onnx`
pub fn is_official_asset(name: &str) -> bool {
    Regex::new(r"^yolo(?:v8|11)[nsmlx]\.onnx$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// 权重缓存目录
pub fn cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|mut d| {
        d.push("ultralytics");
        d
    })
}

/// 解析模型路径
///
/// 已存在的路径直接返回; 官方文件名先查缓存, 缺失时下载到缓存目录
pub fn resolve(model: &str, base_url: &str) -> Result<PathBuf> {
    resolve_in(model, base_url, cache_dir())
}

fn resolve_in(model: &str, base_url: &str, cache: Option<PathBuf>) -> Result<PathBuf> {
    let path = Path::new(model);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    if !is_official_asset(model) {
        bail!("model file not found: {model}");
    }

    let cached = cache
        .ok_or_else(|| anyhow!("no cache directory available to store {model}"))?
        .join(model);
    if cached.is_file() {
        log::debug!("Using cached weights {}", cached.display());
        return Ok(cached);
    }

    let url = format!("{}/{}", base_url.trim_end_matches('/'), model);
    download(&url, &cached)?;
    Ok(cached)
}
