/// 逐帧处理流水线 (Video Processing Pipeline)
///
/// 单线程顺序执行, 每帧依次经过:
/// - Detector: 目标检测
/// - Pose:     姿态估计 (可选)
/// - Tracker:  IoU 跟踪 (可选)
/// - Engine:   ROI 交互状态机
/// - Renderer / Writer / Export: 绘制、写帧、缓存导出记录
///
/// 可选能力出错后在本次运行中永久关闭
pub mod stats;

pub use stats::{write_run_log, FrameTimings, RunStats, RunSummary};

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::{AppConfig, ExportConfig, InteractionConfig, FALLBACK_FPS};
use crate::detection::{Detection, Detector, IouTracker, PoseEstimator, PoseResult, Track, Tracker};
use crate::export::ExportBuffer;
use crate::input::{Frame, FrameReader};
use crate::interaction::{load_regions_lenient, InteractionEngine, Region};
use crate::renderer::Renderer;
use crate::writer::{FrameWriter, ImageSequenceWriter};

/// 进度日志间隔 (处理帧数)
const PROGRESS_EVERY: u64 = 30;

pub struct Pipeline {
    detector: Detector,
    pose: Option<PoseEstimator>,
    tracker: Option<Box<dyn Tracker>>,
    engine: InteractionEngine,
    regions: Vec<Region>,
    renderer: Option<Renderer>,
    writer: Option<Box<dyn FrameWriter>>,
    export: ExportConfig,
    run_log: Option<PathBuf>,
    buffer: ExportBuffer,
    stats: RunStats,
    disabled: Vec<String>,
}

impl Pipeline {
    /// 只含检测器的最小流水线: 不跟踪, 无区域, 无输出
    pub fn new(detector: Detector, interaction: InteractionConfig) -> Self {
        Self {
            detector,
            pose: None,
            tracker: None,
            engine: InteractionEngine::new(interaction),
            regions: Vec::new(),
            renderer: None,
            writer: None,
            export: ExportConfig::default(),
            run_log: None,
            buffer: ExportBuffer::default(),
            stats: RunStats::default(),
            disabled: Vec::new(),
        }
    }

    pub fn with_pose(mut self, pose: PoseEstimator) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_tracker(mut self, tracker: Box<dyn Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_writer(mut self, writer: Box<dyn FrameWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.run_log = self.run_log.take().or_else(|| export.run_log_path());
        self.export = export;
        self
    }

    pub fn with_run_log(mut self, path: PathBuf) -> Self {
        self.run_log = Some(path);
        self
    }

    /// 按运行配置组装
    ///
    /// 模型加载失败、ROI 文件不可读为致命错误; 姿态模型或输出目录失败只关闭对应能力
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let detector = Detector::new(&config.model_path, config.detector.clone())?;

        let regions = match &config.rois {
            Some(path) => load_regions_lenient(path)
                .with_context(|| format!("❌ ROI 文件不可读: {}", path.display()))?,
            None => Vec::new(),
        };
        log::info!("📐 ROI 区域: {} 个", regions.len());

        let mut pipeline = Self::new(detector, config.interaction.clone())
            .with_tracker(Box::new(IouTracker::new(config.tracker.clone())))
            .with_regions(regions)
            .with_export(config.export.clone());

        if let Some(model) = &config.pose.model {
            match PoseEstimator::new(model, &config.pose) {
                Ok(pose) => pipeline = pipeline.with_pose(pose),
                Err(e) => {
                    log::warn!("⚠️ 姿态估计不可用, 仅使用面积判定: {:#}", e);
                    pipeline.disabled.push("pose".into());
                }
            }
        }

        if let Some(dir) = &config.output {
            match ImageSequenceWriter::create(dir) {
                Ok(writer) => {
                    pipeline = pipeline
                        .with_writer(Box::new(writer))
                        .with_renderer(Renderer::new(config.font.as_deref()));
                }
                Err(e) => {
                    log::warn!("⚠️ 输出目录不可用, 不写出标注帧: {:#}", e);
                    pipeline.disabled.push("writer".into());
                }
            }
            if pipeline.run_log.is_none() {
                pipeline.run_log = Some(dir.join("run_log.txt"));
            }
        }

        Ok(pipeline)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn engine(&self) -> &InteractionEngine {
        &self.engine
    }

    pub fn export_buffer(&self) -> &ExportBuffer {
        &self.buffer
    }

    pub fn pose_enabled(&self) -> bool {
        self.pose.is_some()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn writer_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// 处理整个输入直到结束, 然后写出导出文件和运行日志
    ///
    /// 检测和读帧错误直接结束运行
    pub fn run(&mut self, reader: &mut FrameReader) -> Result<RunSummary> {
        let fps = reader.fps().filter(|f| *f > 0.0).unwrap_or(FALLBACK_FPS);
        log::info!("▶️ 开始处理 (fps={:.2})", fps);

        let mut last_time = 0.0;
        while let Some(frame) = reader.next_frame()? {
            let now = frame_time(&frame, fps);
            self.process(frame, now)?;
            last_time = now;

            let n = self.stats.frames_processed;
            if n % PROGRESS_EVERY == 0 {
                log::info!(
                    "🎬 已处理 {} 帧 (t={:.2}s, {:.2} FPS, 事件 {})",
                    n,
                    now,
                    self.stats.effective_fps(),
                    self.engine.events().len()
                );
            }
        }

        // 收尾: 关闭所有未结束的区间
        let tail = self.engine.finish(last_time);
        self.buffer.push_events(&tail);

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                log::warn!("⚠️ 关闭输出失败: {:#}", e);
            }
        }

        self.buffer.flush(&self.export)?;

        let summary = self.stats.summary(
            reader.frames_seen(),
            self.engine.events().len(),
            self.disabled.clone(),
        );
        summary.print();
        if let Some(path) = &self.run_log {
            write_run_log(path, &summary)?;
        }
        Ok(summary)
    }

    /// 处理单帧
    fn process(&mut self, frame: Frame, now: f64) -> Result<()> {
        let mut timings = FrameTimings::default();

        // 1. 检测
        let t = Instant::now();
        let detections = self.detector.detect(&frame.image)?;
        timings.detect_ms = t.elapsed().as_secs_f64() * 1000.0;

        // 2. 姿态
        let t = Instant::now();
        let pose = self.estimate_pose(&frame);
        timings.pose_ms = t.elapsed().as_secs_f64() * 1000.0;
        let pose_ran = pose.is_some();

        // 3. 跟踪
        let t = Instant::now();
        let tracking = self.tracker.is_some();
        let tracks = self.track(&detections);
        timings.track_ms = t.elapsed().as_secs_f64() * 1000.0;

        // 4. 交互
        let events = self.engine.update(&tracks, &self.regions, now, pose.as_ref());
        self.buffer.push_events(&events);

        // 5. 导出记录
        self.buffer.push_tracks(frame.index, now * 1000.0, &tracks);
        self.stats.track_rows += tracks.len() as u64;

        // 6. 绘制 + 写帧
        let rendered = self.writer.is_some();
        if rendered {
            let t = Instant::now();
            let mut canvas = frame.image;
            if let Some(renderer) = &self.renderer {
                let active: Vec<&str> = self
                    .engine
                    .inside_pairs()
                    .into_iter()
                    .map(|(_, roi)| roi)
                    .collect();
                renderer.draw(&mut canvas, &self.regions, &active, &tracks, pose.as_ref());
            }
            timings.render_ms = t.elapsed().as_secs_f64() * 1000.0;
            self.write_frame(frame.index, &canvas);
        }

        log::debug!(
            "frame {} t={:.3}s det={} tracks={} | detect {:.1}ms pose {:.1}ms track {:.2}ms render {:.1}ms",
            frame.index,
            now,
            detections.len(),
            tracks.len(),
            timings.detect_ms,
            timings.pose_ms,
            timings.track_ms,
            timings.render_ms
        );
        self.stats.record(&timings, pose_ran, tracking, rendered);
        Ok(())
    }

    fn estimate_pose(&mut self, frame: &Frame) -> Option<PoseResult> {
        let estimator = self.pose.as_mut()?;
        match estimator.estimate(&frame.image) {
            Ok(pose) => Some(pose),
            Err(e) => {
                log::warn!("⚠️ 姿态估计失败, 本次运行关闭姿态: {:#}", e);
                self.pose = None;
                self.disabled.push("pose".into());
                None
            }
        }
    }

    fn track(&mut self, detections: &[Detection]) -> Vec<Track> {
        let Some(tracker) = self.tracker.as_mut() else {
            return Vec::new();
        };
        match tracker.update(detections) {
            Ok(tracks) => tracks,
            Err(e) => {
                log::warn!("⚠️ 跟踪失败, 本次运行关闭跟踪: {:#}", e);
                self.tracker = None;
                self.disabled.push("tracker".into());
                Vec::new()
            }
        }
    }

    fn write_frame(&mut self, index: u64, image: &image::RgbImage) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writer.write(index, image) {
            log::warn!("⚠️ 写帧失败, 停止输出: {:#}", e);
            self.writer = None;
            self.disabled.push("writer".into());
        }
    }
}

/// 帧时间 (秒): 有采集时间戳用时间戳, 否则按序号 / 帧率
pub fn frame_time(frame: &Frame, fps: f64) -> f64 {
    match frame.timestamp_ms {
        Some(ms) => ms / 1000.0,
        None => frame.index as f64 / fps,
    }
}
