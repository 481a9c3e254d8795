//! 标注帧输出

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

/// 帧输出统一接口 (视频编码器在此接入)
pub trait FrameWriter {
    fn write(&mut self, index: u64, image: &RgbImage) -> Result<()>;

    /// 结束写出
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 图片序列输出: 每帧一张 JPEG
pub struct ImageSequenceWriter {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("无法创建输出目录: {}", dir.display()))?;
        log::info!("💾 标注帧输出到 {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.jpg", index))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameWriter for ImageSequenceWriter {
    fn write(&mut self, index: u64, image: &RgbImage) -> Result<()> {
        let path = self.frame_path(index);
        image
            .save(&path)
            .with_context(|| format!("写入帧失败: {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        log::info!("💾 共写出 {} 帧到 {}", self.written, self.dir.display());
        Ok(())
    }
}
