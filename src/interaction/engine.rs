//! ROI 交互状态机
//!
//! 每个 (轨迹, 区域) 一条状态记录:
//! - 进入: 记录 enter_time
//! - 停留 ≥ approach_seconds: 记录 approach_start
//! - 手腕入区 (姿态) 或框面积突变: 记录 pick_time
//! - 离开: 依次发出 Approach / Pick (若已记录) 和 Leave, 状态复位

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::roi::Region;
use crate::config::InteractionConfig;
use crate::detection::{PoseResult, Track};

/// 事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Approach,
    Pick,
    Leave,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Approach => write!(f, "Approach"),
            EventType::Pick => write!(f, "Pick"),
            EventType::Leave => write!(f, "Leave"),
        }
    }
}

/// 交互事件 (只追加)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub track_id: u32,
    pub roi_id: String,
    pub event_type: EventType,
    pub t_start: f64,
    pub t_end: f64,
    pub duration: f64,
}

impl InteractionEvent {
    pub fn new(track_id: u32, roi_id: &str, event_type: EventType, t_start: f64, t_end: f64) -> Self {
        Self {
            track_id,
            roi_id: roi_id.to_string(),
            event_type,
            t_start,
            t_end,
            duration: (t_end - t_start).max(0.0),
        }
    }
}

/// 单个 (轨迹, 区域) 的状态
#[derive(Clone, Debug, Default, PartialEq)]
struct InteractionState {
    inside: bool,
    enter_time: f64,
    approach_start: Option<f64>,
    pick_time: Option<f64>,
}

impl InteractionState {
    /// 离开: 发出事件并复位
    fn close(&mut self, track_id: u32, roi_id: &str, now: f64, out: &mut Vec<InteractionEvent>) {
        if let Some(start) = self.approach_start {
            out.push(InteractionEvent::new(track_id, roi_id, EventType::Approach, start, now));
        }
        if let Some(start) = self.pick_time {
            out.push(InteractionEvent::new(track_id, roi_id, EventType::Pick, start, now));
        }
        out.push(InteractionEvent::new(track_id, roi_id, EventType::Leave, now, now));
        *self = InteractionState::default();
    }
}

pub struct InteractionEngine {
    config: InteractionConfig,
    states: BTreeMap<(u32, String), InteractionState>,
    events: Vec<InteractionEvent>,
}

impl InteractionEngine {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// 推进一帧, 返回本帧新产生的事件
    ///
    /// `now` 为帧时间 (秒); `pose` 缺失时 Pick 只看框面积变化
    pub fn update(
        &mut self,
        tracks: &[Track],
        regions: &[Region],
        now: f64,
        pose: Option<&PoseResult>,
    ) -> Vec<InteractionEvent> {
        let mut out = Vec::new();

        for track in tracks {
            let (cx, cy) = track.center();
            for region in regions {
                let inside_now = region.contains(cx, cy);
                let key = (track.id, region.id.clone());

                if !inside_now {
                    if let Some(state) = self.states.get_mut(&key) {
                        if state.inside {
                            state.close(track.id, &region.id, now, &mut out);
                        }
                    }
                    continue;
                }

                let state = self.states.entry(key).or_default();
                if !state.inside {
                    *state = InteractionState {
                        inside: true,
                        enter_time: now,
                        ..InteractionState::default()
                    };
                }

                if state.approach_start.is_none()
                    && now - state.enter_time >= self.config.approach_seconds
                {
                    state.approach_start = Some(state.enter_time);
                }

                if state.pick_time.is_none() && pick_detected(&self.config, track, region, pose) {
                    state.pick_time = Some(now);
                }
            }
        }

        // 消失的轨迹按当前时间离开
        let live: BTreeSet<u32> = tracks.iter().map(|t| t.id).collect();
        let vanished: Vec<(u32, String)> = self
            .states
            .keys()
            .filter(|(id, _)| !live.contains(id))
            .cloned()
            .collect();
        for key in vanished {
            if let Some(mut state) = self.states.remove(&key) {
                if state.inside {
                    state.close(key.0, &key.1, now, &mut out);
                }
            }
        }

        for e in out.iter() {
            log::debug!(
                "🔔 {} track={} roi={} [{:.2}, {:.2}]",
                e.event_type,
                e.track_id,
                e.roi_id,
                e.t_start,
                e.t_end
            );
        }
        self.events.extend(out.iter().cloned());
        out
    }

    /// 结束运行: 关闭所有未结束的区间
    pub fn finish(&mut self, now: f64) -> Vec<InteractionEvent> {
        let mut out = Vec::new();
        for ((track_id, roi_id), state) in self.states.iter_mut() {
            if state.inside {
                state.close(*track_id, roi_id, now, &mut out);
            }
        }
        self.states.clear();
        self.events.extend(out.iter().cloned());
        out
    }

    /// 全部事件 (按发生顺序)
    pub fn events(&self) -> &[InteractionEvent] {
        &self.events
    }

    /// 当前在区域内的 (轨迹, 区域) 对
    pub fn inside_pairs(&self) -> Vec<(u32, &str)> {
        self.states
            .iter()
            .filter(|(_, s)| s.inside)
            .map(|((id, roi), _)| (*id, roi.as_str()))
            .collect()
    }
}

/// Pick 判定
///
/// 可信手腕关键点落在区域内即判定; 否则看当前框与上一帧框的面积相对变化
fn pick_detected(
    config: &InteractionConfig,
    track: &Track,
    region: &Region,
    pose: Option<&PoseResult>,
) -> bool {
    if let Some(pose) = pose {
        let wrist_inside = pose
            .wrists()
            .into_iter()
            .any(|(x, y, c)| c >= config.pose_conf && region.contains(x, y));
        if wrist_inside {
            return true;
        }
    }

    let Some(prev) = track.previous_bbox() else {
        return false;
    };
    let prev_area = prev.area();
    if prev_area <= 0.0 {
        return false;
    }
    (track.bbox.area() - prev_area).abs() / prev_area >= config.pick_area_delta
}
