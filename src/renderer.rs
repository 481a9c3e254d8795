//! 叠加绘制: ROI 多边形、轨迹框与标签、姿态骨架

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use crate::detection::{class_name, id_to_color, PoseResult, Track};
use crate::interaction::Region;
use crate::SKELETON;

const ROI_COLOR: Rgb<u8> = Rgb([255, 255, 0]); // 空闲区域: 黄色
const ROI_ACTIVE_COLOR: Rgb<u8> = Rgb([255, 0, 0]); // 有人在内: 红色
const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const SKELETON_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const KEYPOINT_CONF: f32 = 0.3;

pub struct Renderer {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Renderer {
    /// 加载标签字体, 失败时只画图形不画文字
    pub fn new(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    log::info!("✅ 字体加载成功: {}", path.display());
                    Some(font)
                }
                Err(e) => {
                    log::warn!("⚠️ 字体无效, 不绘制标签: {} ({})", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("⚠️ 字体读取失败, 不绘制标签: {} ({})", path.display(), e);
                None
            }
        });
        Self {
            font,
            scale: PxScale::from(16.0),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 绘制一帧的全部叠加层
    ///
    /// `active` 为当前有轨迹停留的 ROI id
    pub fn draw(
        &self,
        image: &mut RgbImage,
        regions: &[Region],
        active: &[&str],
        tracks: &[Track],
        pose: Option<&PoseResult>,
    ) {
        for region in regions {
            let color = if active.contains(&region.id.as_str()) {
                ROI_ACTIVE_COLOR
            } else {
                ROI_COLOR
            };
            self.draw_region(image, region, color);
        }
        for track in tracks {
            self.draw_track(image, track);
        }
        if let Some(pose) = pose {
            draw_pose(image, pose);
        }
    }

    fn draw_region(&self, image: &mut RgbImage, region: &Region, color: Rgb<u8>) {
        let n = region.points.len();
        for i in 0..n {
            let start = region.points[i];
            let end = region.points[(i + 1) % n];
            draw_line_segment_mut(image, start, end, color);
        }
        if let (Some(font), Some(&(x, y))) = (&self.font, region.points.first()) {
            draw_text_mut(image, color, x as i32 + 2, y as i32 + 2, self.scale, font, &region.id);
        }
    }

    fn draw_track(&self, image: &mut RgbImage, track: &Track) {
        let (r, g, b) = id_to_color(track.id);
        let color = Rgb([r, g, b]);
        let bbox = &track.bbox;

        // 双线边框
        for inset in 0..2 {
            let w = bbox.width() as i32 - 2 * inset;
            let h = bbox.height() as i32 - 2 * inset;
            if w < 1 || h < 1 {
                break;
            }
            let rect = Rect::at(bbox.x1 as i32 + inset, bbox.y1 as i32 + inset)
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        // 绘制标签
        if let Some(font) = &self.font {
            let label = track_label(track);
            let y = (bbox.y1 - self.scale.y - 2.0).max(0.0);
            draw_text_mut(image, color, bbox.x1 as i32, y as i32, self.scale, font, &label);
        }
    }
}

/// 标签: 轨迹 id + 类别名 + 置信度
fn track_label(track: &Track) -> String {
    format!("ID {} {} {:.2}", track.id, class_name(track.class_id), track.score)
}

/// 绘制骨架连接与关键点
fn draw_pose(image: &mut RgbImage, pose: &PoseResult) {
    for &(idx1, idx2) in &SKELETON {
        let (Some(&(x1, y1, c1)), Some(&(x2, y2, c2))) = (pose.points.get(idx1), pose.points.get(idx2))
        else {
            continue;
        };
        if c1 > KEYPOINT_CONF && c2 > KEYPOINT_CONF {
            draw_line_segment_mut(image, (x1, y1), (x2, y2), SKELETON_COLOR);
        }
    }

    // 关键点画在骨架之上
    for &(x, y, conf) in &pose.points {
        if conf > KEYPOINT_CONF {
            draw_filled_circle_mut(image, (x as i32, y as i32), 3, KEYPOINT_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use std::collections::VecDeque;

    fn track(id: u32, bbox: BBox) -> Track {
        Track {
            id,
            bbox,
            score: 0.5,
            class_id: 0,
            hits: 1,
            misses: 0,
            age: 0,
            history: VecDeque::new(),
        }
    }

    #[test]
    fn missing_font_disables_labels() {
        let renderer = Renderer::new(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!renderer.has_font());
        assert!(!Renderer::new(None).has_font());
    }

    #[test]
    fn labels_carry_class_names() {
        let mut t = track(4, BBox::new(0., 0., 10., 10.));
        assert_eq!(track_label(&t), "ID 4 person 0.50");
        t.class_id = 39;
        assert_eq!(track_label(&t), "ID 4 bottle 0.50");
        t.class_id = 500;
        assert_eq!(track_label(&t), "ID 4 500 0.50");
    }

    #[test]
    fn draws_boxes_and_regions() {
        let renderer = Renderer::new(None);
        let mut image = RgbImage::new(64, 64);
        let regions = vec![Region::from_rect("a", [0., 0., 30., 30.])];
        let tracks = vec![track(1, BBox::new(40., 40., 60., 60.))];
        renderer.draw(&mut image, &regions, &["a"], &tracks, None);

        assert_eq!(*image.get_pixel(10, 0), ROI_ACTIVE_COLOR);
        let (r, g, b) = id_to_color(1);
        assert_eq!(*image.get_pixel(50, 40), Rgb([r, g, b]));
        // 框内部不填充
        assert_eq!(*image.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_boxes_and_pose_are_safe() {
        let renderer = Renderer::new(None);
        let mut image = RgbImage::new(16, 16);
        let tracks = vec![track(2, BBox::new(5., 5., 5., 5.)), track(3, BBox::new(-20., -20., 40., 40.))];
        let pose = PoseResult::new(vec![(8., 8., 0.9); 17]);
        renderer.draw(&mut image, &[], &[], &tracks, Some(&pose));
        assert_eq!(*image.get_pixel(8, 8), KEYPOINT_COLOR);
    }
}
