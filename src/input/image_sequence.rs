//! 图片序列帧源: 目录内按文件名排序的图片, 或单张图片

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::{Frame, FrameSource};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
    fps: Option<f64>,
}

impl ImageSequenceSource {
    /// 打开输入源, 路径不存在或目录中没有图片时报错
    pub fn open(path: &Path) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("无法打开输入源: {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            files.sort();
            if files.is_empty() {
                bail!("输入目录中没有图片: {}", path.display());
            }
            files
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            bail!("无法打开输入源: {}", path.display());
        };

        log::info!("📹 输入源: {} ({} 帧)", path.display(), files.len());
        Ok(Self {
            files,
            next: 0,
            fps: None,
        })
    }

    /// 指定名义帧率 (图片本身不带帧率)
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("图片解码失败: {}", path.display()))?
            .to_rgb8();
        let index = self.next as u64;
        self.next += 1;
        Ok(Some(Frame {
            index,
            image,
            timestamp_ms: None,
        }))
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn reads_sorted_images_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 20u8), ("a.png", 10u8)] {
            RgbImage::from_pixel(4, 3, Rgb([value, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.image.dimensions(), (4, 3));
        assert_eq!(first.image.get_pixel(0, 0)[0], 10);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.image.get_pixel(0, 0)[0], 20);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_or_empty_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(&dir.path().join("nope")).is_err());
        assert!(ImageSequenceSource::open(dir.path()).is_err());
    }

    #[test]
    fn single_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.png");
        RgbImage::new(2, 2).save(&path).unwrap();
        let mut source = ImageSequenceSource::open(&path).unwrap().with_fps(12.0);
        assert_eq!(source.fps(), Some(12.0));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
