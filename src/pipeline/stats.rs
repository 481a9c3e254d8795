//! 运行统计与运行日志

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

/// 分阶段累计耗时 (毫秒)
#[derive(Clone, Debug, Default)]
pub struct FrameTimings {
    pub detect_ms: f64,
    pub pose_ms: f64,
    pub track_ms: f64,
    pub render_ms: f64,
}

/// 流水线内部统计
#[derive(Debug)]
pub struct RunStats {
    pub frames_processed: u64,
    pub track_rows: u64,
    pub totals: FrameTimings,
    pose_frames: u64,
    track_frames: u64,
    render_frames: u64,
    started: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            frames_processed: 0,
            track_rows: 0,
            totals: FrameTimings::default(),
            pose_frames: 0,
            track_frames: 0,
            render_frames: 0,
            started: Instant::now(),
        }
    }
}

impl RunStats {
    pub fn record(&mut self, t: &FrameTimings, pose: bool, track: bool, render: bool) {
        self.frames_processed += 1;
        self.totals.detect_ms += t.detect_ms;
        if pose {
            self.totals.pose_ms += t.pose_ms;
            self.pose_frames += 1;
        }
        if track {
            self.totals.track_ms += t.track_ms;
            self.track_frames += 1;
        }
        if render {
            self.totals.render_ms += t.render_ms;
            self.render_frames += 1;
        }
    }

    /// 当前有效帧率 (处理帧 / 墙钟时间)
    pub fn effective_fps(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames_processed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn summary(&self, frames_seen: u64, events: usize, disabled: Vec<String>) -> RunSummary {
        let avg = |total: f64, n: u64| if n > 0 { total / n as f64 } else { 0.0 };
        RunSummary {
            frames_seen,
            frames_processed: self.frames_processed,
            track_rows: self.track_rows,
            events,
            avg_detect_ms: avg(self.totals.detect_ms, self.frames_processed),
            avg_pose_ms: avg(self.totals.pose_ms, self.pose_frames),
            avg_track_ms: avg(self.totals.track_ms, self.track_frames),
            avg_render_ms: avg(self.totals.render_ms, self.render_frames),
            effective_fps: self.effective_fps(),
            elapsed_s: self.started.elapsed().as_secs_f64(),
            disabled,
        }
    }
}

/// 一次运行的结果汇总
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub track_rows: u64,
    pub events: usize,
    pub avg_detect_ms: f64,
    pub avg_pose_ms: f64,
    pub avg_track_ms: f64,
    pub avg_render_ms: f64,
    pub effective_fps: f64,
    pub elapsed_s: f64,
    /// 运行中被关闭的能力 (pose / tracker / writer)
    pub disabled: Vec<String>,
}

impl RunSummary {
    pub fn print(&self) {
        log::info!("========== 运行汇总 ==========");
        log::info!("📊 读取帧: {}  处理帧: {}", self.frames_seen, self.frames_processed);
        log::info!("📊 轨迹行: {}  事件: {}", self.track_rows, self.events);
        log::info!(
            "⏱️ 检测 {:.1}ms | 姿态 {:.1}ms | 跟踪 {:.2}ms | 绘制 {:.1}ms",
            self.avg_detect_ms,
            self.avg_pose_ms,
            self.avg_track_ms,
            self.avg_render_ms
        );
        log::info!("🚀 有效帧率: {:.2} FPS (耗时 {:.1}s)", self.effective_fps, self.elapsed_s);
        if !self.disabled.is_empty() {
            log::warn!("⚠️ 运行中关闭的能力: {}", self.disabled.join(", "));
        }
    }
}

/// 写出纯文本运行日志
pub fn write_run_log(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
    }
    let disabled = if summary.disabled.is_empty() {
        "none".to_string()
    } else {
        summary.disabled.join(",")
    };
    let text = format!(
        "finished_at: {}\n\
         frames_seen: {}\n\
         frames_processed: {}\n\
         track_rows: {}\n\
         events: {}\n\
         avg_detect_ms: {:.3}\n\
         avg_pose_ms: {:.3}\n\
         avg_track_ms: {:.3}\n\
         avg_render_ms: {:.3}\n\
         effective_fps: {:.3}\n\
         elapsed_s: {:.3}\n\
         disabled: {}\n",
        crate::gen_time_string("-"),
        summary.frames_seen,
        summary.frames_processed,
        summary.track_rows,
        summary.events,
        summary.avg_detect_ms,
        summary.avg_pose_ms,
        summary.avg_track_ms,
        summary.avg_render_ms,
        summary.effective_fps,
        summary.elapsed_s,
        disabled
    );
    fs::write(path, text).with_context(|| format!("写入运行日志失败: {}", path.display()))?;
    log::info!("📝 运行日志: {}", path.display());
    Ok(())
}
