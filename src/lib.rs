#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置与参数文件
pub mod detection; // 检测 + 姿态 + 跟踪
pub mod export; // 轨迹/事件导出 (JSON/CSV)
pub mod input; // 帧输入系统
pub mod interaction; // ROI 交互状态机
pub mod models; // 推理后端接口与 YOLOv8 解码
pub mod pipeline; // 单线程逐帧流水线
pub mod renderer; // 叠加绘制
pub mod writer; // 标注帧输出

pub mod ort_backend;

pub use crate::config::{AppConfig, Args, Mode};
pub use crate::detection::{BBox, Detection, Detector, IouTracker, PoseEstimator, PoseResult, Track, Tracker};
pub use crate::interaction::{EventType, InteractionEngine, InteractionEvent, Region};
pub use crate::models::{InferenceBackend, Letterbox, OutputFormat};
pub use crate::ort_backend::OrtBackend;
pub use crate::pipeline::{Pipeline, RunSummary};

/// 贪心非极大值抑制 (greedy NMS)
///
/// 按置信度降序排列,依次保留当前最高分框,丢弃与已保留框 IoU 超过阈值的框。
/// 原地完成,结果按置信度降序。
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// COCO 17 关键点骨架连接
pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// COCO 关键点索引: 9 左手腕, 10 右手腕
pub const WRIST_KEYPOINTS: [usize; 2] = [9, 10];
