// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 标签字体: 当前目录 → Ultralytics 配置目录 → 下载

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use anyhow::{anyhow, Context, Result};

use crate::utils::download;

pub const FONT_BASE_URL: &str = "https://ultralytics.com/assets";

/// Ultralytics 配置目录下的字体路径
pub fn font_config_path(font: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|mut d| {
        d.push("Ultralytics");
        d.push(font);
        d
    })
}

/// 查找字体文件, 都不存在时下载到配置目录(无配置目录时下载到当前目录)
pub fn check_font(font: &str) -> Result<PathBuf> {
    let font_path_current = PathBuf::from(font);
    if font_path_current.is_file() {
        return Ok(font_path_current);
    }

    let font_path_config = font_config_path(font);
    if let Some(p) = font_path_config.as_ref().filter(|p| p.is_file()) {
        return Ok(p.clone());
    }

    let file_name = Path::new(font)
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("invalid font name: {font}"))?;
    let url = format!("{FONT_BASE_URL}/{file_name}");
    let dst = font_path_config.unwrap_or(font_path_current);
    download(&url, &dst)?;
    Ok(dst)
}

/// 加载字体
pub fn load_font(font: &str) -> Result<FontVec> {
    let path = check_font(font)?;
    let buffer =
        std::fs::read(&path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(buffer)
        .map_err(|e| anyhow!("invalid font file {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_font_is_found_first() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("Custom.ttf");
        std::fs::write(&font, b"not really a font").unwrap();

        let found = check_font(font.to_str().unwrap()).unwrap();
        assert_eq!(found, font);
    }

    #[test]
    fn test_invalid_font_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("Broken.ttf");
        std::fs::write(&font, b"not really a font").unwrap();

        let err = load_font(font.to_str().unwrap()).err().unwrap();
        assert!(err.to_string().contains("invalid font file"));
    }
}
