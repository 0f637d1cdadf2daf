// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 输入图片: 本地路径或 http(s) URL

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::utils::download::fetch;

/// 已加载的输入图片
pub struct LoadedImage {
    /// 文件名(不含扩展名), 用于保存结果
    pub stem: String,
    pub image: DynamicImage,
}

pub fn is_url(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// 取引用的文件名部分: `https://x/images/bus.jpg?raw=1` → `bus`
pub fn stem_of(reference: &str) -> String {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string()
}

pub fn load_image(reference: &str) -> Result<LoadedImage> {
    let image = if is_url(reference) {
        let bytes = fetch(reference)?;
        image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode image from {reference}"))?
    } else {
        image::open(reference).with_context(|| format!("failed to open image {reference}"))?
    };
    log::debug!(
        "Loaded {} ({}x{})",
        reference,
        image.width(),
        image.height()
    );

    Ok(LoadedImage {
        stem: stem_of(reference),
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://ultralytics.com/images/bus.jpg"));
        assert!(is_url("HTTP://example.com/a.png"));
        assert!(!is_url("images/bus.jpg"));
        assert!(!is_url("/tmp/https.jpg"));
    }

    #[test]
    fn test_stem_of() {
        assert_eq!(stem_of("https://ultralytics.com/images/bus.jpg"), "bus");
        assert_eq!(stem_of("https://example.com/zidane.jpg?raw=true"), "zidane");
        assert_eq!(stem_of("data/street.png"), "street");
        assert_eq!(stem_of("https://example.com/"), "example");
        assert_eq!(stem_of(""), "image");
    }

    #[test]
    fn test_load_local_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("street.png");
        image::RgbImage::new(32, 16).save(&path).unwrap();

        let loaded = load_image(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.stem, "street");
        assert_eq!((loaded.image.width(), loaded.image.height()), (32, 16));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let err = load_image("no/such/image.jpg").err().unwrap();
        assert!(format!("{err:#}").contains("no/such/image.jpg"));
    }
}
