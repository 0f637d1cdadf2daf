/// HTTP 下载工具 (模型权重 / 字体)
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(500);

/// 下载 `url` 到内存
pub fn fetch(url: &str) -> Result<Vec<u8>> {
    let resp = ureq::get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let expected = resp
        .header("Content-Length")
        .and_then(|s| s.parse::<usize>().ok());

    let mut buffer = Vec::with_capacity(expected.unwrap_or(0));
    resp.into_reader()
        .read_to_end(&mut buffer)
        .with_context(|| format!("failed to read response body from {url}"))?;

    if buffer.is_empty() {
        bail!("empty response from {url}");
    }
    if let Some(n) = expected {
        if n != buffer.len() {
            bail!("truncated download from {url}: {} of {n} bytes", buffer.len());
        }
    }
    Ok(buffer)
}

/// 下载 `url` 并保存到 `dst`
///
/// 先写入临时文件再重命名, 中断的下载不会留下半个文件
pub fn download(url: &str, dst: &Path) -> Result<()> {
    log::info!("Downloading {url} -> {}", dst.display());
    let buffer = fetch(url)?;

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let partial = dst.with_extension("part");
    {
        let mut writer = std::io::BufWriter::new(
            fs::File::create(&partial)
                .with_context(|| format!("failed to create {}", partial.display()))?,
        );
        writer.write_all(&buffer)?;
        writer.flush()?;
    }
    fs::rename(&partial, dst)
        .with_context(|| format!("failed to move download into {}", dst.display()))?;

    log::info!("Saved {} bytes at {}", buffer.len(), dst.display());
    Ok(())
}
