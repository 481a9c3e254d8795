//! 多目标跟踪 (贪心 IoU 关联)
//! Multi-object tracking with greedy IoU association

use std::collections::VecDeque;

use anyhow::Result;

use super::types::{BBox, Detection};
use crate::config::TrackerConfig;

// ========== 公共数据结构 ==========

/// 跟踪对象
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// 唯一跟踪ID (单调递增,不复用)
    pub id: u32,

    /// 当前边界框
    pub bbox: BBox,

    pub score: f32,
    pub class_id: u32,

    /// 累计匹配次数
    pub hits: u32,

    /// 连续丢失帧数
    pub misses: u32,

    /// 创建以来经历的更新次数
    pub age: u32,

    /// 历史边界框 (旧 → 新, 有界)
    pub history: VecDeque<BBox>,
}

impl Track {
    fn new(id: u32, det: &Detection) -> Self {
        Self {
            id,
            bbox: det.bbox,
            score: det.score,
            class_id: det.class_id,
            hits: 1,
            misses: 0,
            age: 0,
            history: VecDeque::new(),
        }
    }

    /// 用匹配到的检测更新轨迹
    fn apply(&mut self, det: &Detection, max_history: usize) {
        if max_history > 0 {
            self.history.push_back(self.bbox);
            while self.history.len() > max_history {
                self.history.pop_front();
            }
        }
        self.bbox = det.bbox;
        self.score = det.score;
        self.class_id = det.class_id;
        self.hits += 1;
        self.misses = 0;
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    /// 上一次记录的边界框
    pub fn previous_bbox(&self) -> Option<&BBox> {
        self.history.back()
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
///
/// 关联策略可替换, 流水线只依赖此接口
pub trait Tracker {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测框
    ///
    /// # 返回
    /// 当前所有活跃的跟踪对象 (按创建顺序)
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Track>>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== IoU 跟踪器 ==========

/// 贪心 IoU 跟踪器
///
/// 每条轨迹按创建顺序挑选 IoU 最高的未占用检测,不做全局最优匹配。
/// 重叠含糊时结果依赖轨迹顺序。
pub struct IouTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl IouTracker {
    pub fn new(config: TrackerConfig) -> Self {
        if config.min_hits > 1 && !config.defer_new_track_pruning {
            log::warn!(
                "⚠️ min_hits={} 且未启用 defer_new_track_pruning: 新轨迹会在创建当帧被剪除",
                config.min_hits
            );
        }
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// 下一个将分配的ID
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn keep(&self, track: &Track) -> bool {
        if track.misses > self.config.max_missed {
            return false;
        }
        if track.hits >= self.config.min_hits {
            return true;
        }
        self.config.defer_new_track_pruning && track.age < self.config.min_hits
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Track>> {
        let mut used = vec![false; detections.len()];
        let iou_match = self.config.iou_match;
        let max_history = self.config.history;

        // 1. 已有轨迹依次贪心匹配
        for track in self.tracks.iter_mut() {
            track.age += 1;

            let mut best: Option<usize> = None;
            let mut best_iou = 0.0f32;
            for (j, det) in detections.iter().enumerate() {
                if used[j] {
                    continue;
                }
                let iou = track.bbox.iou(&det.bbox);
                if iou > best_iou {
                    best_iou = iou;
                    best = Some(j);
                }
            }

            match best {
                Some(j) if best_iou >= iou_match => {
                    track.apply(&detections[j], max_history);
                    used[j] = true;
                }
                _ => track.misses += 1,
            }
        }

        // 2. 未匹配检测生成新轨迹
        for (j, det) in detections.iter().enumerate() {
            if used[j] {
                continue;
            }
            self.tracks.push(Track::new(self.next_id, det));
            self.next_id += 1;
        }

        // 3. 剪除
        let kept: Vec<Track> = self
            .tracks
            .iter()
            .filter(|t| self.keep(t))
            .cloned()
            .collect();
        let removed = self.tracks.len() - kept.len();
        if removed > 0 {
            log::debug!("🧹 剪除 {} 条轨迹", removed);
        }
        self.tracks = kept;

        Ok(self.tracks.clone())
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

// ========== 工具函数 ==========

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
