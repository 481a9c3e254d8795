//! 端到端流水线测试: 假推理后端 + 内存帧源 + 临时目录

use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{Array, IxDyn};

use roiwatch_rs::config::{AppConfig, DetectorConfig, ExportConfig, InteractionConfig, Mode, TrackerConfig, VideoConfig};
use roiwatch_rs::export::{read_json, read_tracks_csv, TrackRecord};
use roiwatch_rs::input::{Frame, FrameReader, FrameSource};
use roiwatch_rs::renderer::Renderer;
use roiwatch_rs::writer::{FrameWriter, ImageSequenceWriter};
use roiwatch_rs::{
    Detection, Detector, EventType, InferenceBackend, InteractionEvent, IouTracker, OutputFormat,
    Pipeline, PoseEstimator, Region, Track, Tracker,
};

const SIZE: u32 = 100;
const FPS: f64 = 10.0;

/// 按帧序号给出检测框的假后端: 前 15 帧在 ROI 内, 之后跳到 ROI 外
struct ScriptedBackend {
    calls: usize,
}

impl InferenceBackend for ScriptedBackend {
    fn run(&mut self, _xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let row = if self.calls < 15 {
            [10., 10., 30., 30., 0.9, 0.]
        } else {
            [60., 60., 80., 80., 0.9, 0.]
        };
        self.calls += 1;
        Ok(vec![Array::from_shape_vec((1, 1, 6), row.to_vec())?.into_dyn()])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct FailingBackend;

impl InferenceBackend for FailingBackend {
    fn run(&mut self, _xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        bail!("inference failed")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct BrokenTracker;

impl Tracker for BrokenTracker {
    fn update(&mut self, _detections: &[Detection]) -> Result<Vec<Track>> {
        bail!("tracker state corrupted")
    }

    fn reset(&mut self) {}

    fn track_count(&self) -> usize {
        0
    }
}

struct BrokenWriter;

impl FrameWriter for BrokenWriter {
    fn write(&mut self, _index: u64, _image: &RgbImage) -> Result<()> {
        bail!("disk full")
    }
}

/// 内存帧源, 不带时间戳
struct MemorySource {
    total: u64,
    next: u64,
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        Ok(Some(Frame {
            index,
            image: RgbImage::new(SIZE, SIZE),
            timestamp_ms: None,
        }))
    }

    fn fps(&self) -> Option<f64> {
        Some(FPS)
    }
}

fn reader(total: u64) -> FrameReader {
    let video = VideoConfig {
        every_n: 1,
        max_frames: None,
        fps: None,
    };
    FrameReader::new(Box::new(MemorySource { total, next: 0 }), &video)
}

fn detector(backend: Box<dyn InferenceBackend>) -> Detector {
    let config = DetectorConfig {
        imgsz: SIZE,
        format: OutputFormat::Xyxy,
        ..DetectorConfig::default()
    };
    Detector::with_backend(backend, config)
}

fn tracker() -> Box<dyn Tracker> {
    Box::new(IouTracker::new(TrackerConfig {
        max_missed: 0,
        ..TrackerConfig::default()
    }))
}

fn shelf() -> Vec<Region> {
    vec![Region::from_rect("shelf", [0., 0., 50., 50.])]
}

fn exports(dir: &Path) -> ExportConfig {
    ExportConfig {
        json_path: Some(dir.join("tracks.json")),
        csv_path: Some(dir.join("tracks.csv")),
        events_path: Some(dir.join("events.json")),
    }
}

#[test]
fn dwell_then_exit_produces_approach_and_leave() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(
        detector(Box::new(ScriptedBackend { calls: 0 })),
        InteractionConfig::default(),
    )
    .with_tracker(tracker())
    .with_regions(shelf())
    .with_export(exports(dir.path()));

    let summary = pipeline.run(&mut reader(20)).unwrap();
    assert_eq!(summary.frames_seen, 20);
    assert_eq!(summary.frames_processed, 20);
    assert_eq!(summary.track_rows, 20);
    assert!(summary.disabled.is_empty());

    let events = pipeline.engine().events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::Approach);
    assert_eq!(events[0].track_id, 1);
    assert_eq!(events[0].roi_id, "shelf");
    assert!((events[0].t_start - 0.0).abs() < 1e-9);
    assert!((events[0].t_end - 1.5).abs() < 1e-9);
    assert_eq!(events[1].event_type, EventType::Leave);
    assert!((events[1].duration).abs() < 1e-9);

    // 导出文件
    let rows = read_tracks_csv(&dir.path().join("tracks.csv")).unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[0].track_id, 1);
    assert_eq!(rows[0].bbox, [10., 10., 30., 30.]);
    assert_eq!(rows[19].track_id, 2);
    assert_eq!(rows[19].frame, 19);

    let json: Vec<TrackRecord> = read_json(&dir.path().join("tracks.json")).unwrap();
    assert_eq!(json, rows);

    let exported: Vec<InteractionEvent> = read_json(&dir.path().join("events.json")).unwrap();
    assert_eq!(exported.as_slice(), events);

    let log = fs::read_to_string(dir.path().join("run_log.txt")).unwrap();
    assert!(log.contains("frames_processed: 20"));
}

#[test]
fn open_interval_is_closed_at_end_of_run() {
    let mut pipeline = Pipeline::new(
        detector(Box::new(ScriptedBackend { calls: 0 })),
        InteractionConfig::default(),
    )
    .with_tracker(tracker())
    .with_regions(shelf());

    // 只跑 5 帧, 轨迹始终在区域内
    pipeline.run(&mut reader(5)).unwrap();
    let events = pipeline.engine().events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Leave);
    assert!((events[0].t_start - 0.4).abs() < 1e-9);
}

#[test]
fn tracker_failure_disables_tracking() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(
        detector(Box::new(ScriptedBackend { calls: 0 })),
        InteractionConfig::default(),
    )
    .with_tracker(Box::new(BrokenTracker))
    .with_regions(shelf())
    .with_export(exports(dir.path()));

    let summary = pipeline.run(&mut reader(6)).unwrap();
    assert_eq!(summary.frames_processed, 6);
    assert!(!pipeline.tracking_enabled());
    assert_eq!(summary.disabled, vec!["tracker".to_string()]);
    assert!(pipeline.engine().events().is_empty());

    // 空导出也要生成文件
    assert_eq!(fs::read_to_string(dir.path().join("tracks.csv")).unwrap(), "");
    assert_eq!(fs::read_to_string(dir.path().join("tracks.json")).unwrap().trim(), "[]");
}

#[test]
fn writer_failure_drops_writer_and_run_continues() {
    let mut pipeline = Pipeline::new(
        detector(Box::new(ScriptedBackend { calls: 0 })),
        InteractionConfig::default(),
    )
    .with_tracker(tracker())
    .with_writer(Box::new(BrokenWriter));

    let summary = pipeline.run(&mut reader(4)).unwrap();
    assert_eq!(summary.frames_processed, 4);
    assert!(!pipeline.writer_enabled());
    assert_eq!(summary.disabled, vec!["writer".to_string()]);
}

#[test]
fn pose_failure_disables_pose_and_keeps_area_rule() {
    let mut pipeline = Pipeline::new(
        detector(Box::new(ScriptedBackend { calls: 0 })),
        InteractionConfig::default(),
    )
    .with_pose(PoseEstimator::with_backend(Box::new(FailingBackend), SIZE))
    .with_tracker(tracker())
    .with_regions(shelf());

    let summary = pipeline.run(&mut reader(20)).unwrap();
    assert!(!pipeline.pose_enabled());
    assert_eq!(summary.disabled, vec!["pose".to_string()]);
    assert_eq!(pipeline.engine().events().len(), 2);
}

#[test]
fn detector_failure_ends_the_run() {
    let mut pipeline = Pipeline::new(detector(Box::new(FailingBackend)), InteractionConfig::default());
    assert!(pipeline.run(&mut reader(3)).is_err());
}

#[test]
fn annotated_frames_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("annotated");
    let mut pipeline = Pipeline::new(
        detector(Box::new(ScriptedBackend { calls: 0 })),
        InteractionConfig::default(),
    )
    .with_tracker(tracker())
    .with_regions(shelf())
    .with_renderer(Renderer::new(None))
    .with_writer(Box::new(ImageSequenceWriter::create(&out).unwrap()));

    pipeline.run(&mut reader(3)).unwrap();
    for i in 0..3 {
        assert!(out.join(format!("frame_{:06}.jpg", i)).is_file());
    }
}

#[test]
fn missing_model_is_fatal() {
    let mut config = AppConfig::for_mode(Mode::Fast);
    config.model_path = "/nonexistent/model.onnx".into();
    assert!(Pipeline::from_config(&config).is_err());
}
