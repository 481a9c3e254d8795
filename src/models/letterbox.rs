// Letterbox 预处理
// 等比缩放到 size×size 画布中央, 四周填充 114 灰色

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::Array4;

use crate::detection::BBox;

/// 填充灰度值
pub const PAD_VALUE: u8 = 114;

/// 一次 letterbox 变换的参数 (用于坐标还原)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub new_w: u32,
    pub new_h: u32,
    pub size: u32,
}

impl Letterbox {
    /// 计算 letterbox 参数
    ///
    /// scale = min(size/h, size/w), 缩放后尺寸四舍五入, 居中放置
    pub fn new(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / height as f32).min(size as f32 / width as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, size.max(1));
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, size.max(1));
        Self {
            scale,
            pad_x: size.saturating_sub(new_w) / 2,
            pad_y: size.saturating_sub(new_h) / 2,
            new_w,
            new_h,
            size,
        }
    }

    /// 预处理: RGB 帧 → [1,3,size,size] 张量, 值域 [0,1]
    pub fn apply(image: &RgbImage, size: u32) -> Result<(Array4<f32>, Self)> {
        let (w0, h0) = image.dimensions();
        if w0 == 0 || h0 == 0 || size == 0 {
            anyhow::bail!("空图像无法做 letterbox: {}x{} → {}", w0, h0, size);
        }
        let lb = Self::new(w0, h0, size);

        // 高性能缩放
        let src = fr::images::ImageRef::new(w0, h0, image.as_raw(), fr::PixelType::U8x3)
            .context("创建缩放源图像失败")?;
        let mut dst = fr::images::Image::new(lb.new_w, lb.new_h, fr::PixelType::U8x3);
        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        resizer
            .resize(&src, &mut dst, Some(&options))
            .context("letterbox 缩放失败")?;
        let raw = dst.buffer();

        let s = size as usize;
        let mut ys = Array4::from_elem((1, 3, s, s), PAD_VALUE as f32 / 255.0);
        let (nw, nh) = (lb.new_w as usize, lb.new_h as usize);
        let (px, py) = (lb.pad_x as usize, lb.pad_y as usize);
        for y in 0..nh {
            for x in 0..nw {
                let i = (y * nw + x) * 3;
                ys[[0, 0, py + y, px + x]] = raw[i] as f32 / 255.0;
                ys[[0, 1, py + y, px + x]] = raw[i + 1] as f32 / 255.0;
                ys[[0, 2, py + y, px + x]] = raw[i + 2] as f32 / 255.0;
            }
        }

        Ok((ys, lb))
    }

    /// letterbox 坐标 → 原图坐标 (不裁剪)
    pub fn unmap_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// letterbox 坐标框 → 原图坐标框, 裁剪到 [0,w]×[0,h]
    pub fn unmap_box(&self, bbox: &BBox, width: u32, height: u32) -> BBox {
        let (x1, y1) = self.unmap_point(bbox.x1, bbox.y1);
        let (x2, y2) = self.unmap_point(bbox.x2, bbox.y2);
        BBox::new(x1, y1, x2, y2).clip(width as f32, height as f32)
    }
}
