/// 感知系统 (Perception)
///
/// 每帧依次执行:
/// - Detector: 目标检测
/// - Pose:     姿态估计 (可选)
/// - Tracker:  目标追踪
pub mod detector;
pub mod pose;
pub mod tracker;
pub mod types;

pub use detector::Detector;
pub use pose::PoseEstimator;
pub use tracker::{id_to_color, IouTracker, Track, Tracker};
pub use types::{class_name, compute_iou, BBox, Detection, PoseResult, COCO_CLASSES};
