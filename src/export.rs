//! 轨迹 / 事件导出 (JSON, CSV)
//!
//! 记录先缓存在内存, 运行结束时一次写出

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;
use crate::detection::Track;
use crate::interaction::InteractionEvent;

pub const TRACK_CSV_HEADER: &str = "frame,time_ms,track_id,score,cls,x1,y1,x2,y2";
pub const EVENT_CSV_HEADER: &str = "track_id,roi_id,event_type,t_start,t_end,duration";

/// 每 (帧, 轨迹) 一行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub frame: u64,
    pub time_ms: f64,
    pub track_id: u32,
    pub score: f32,
    pub cls: u32,
    pub bbox: [f32; 4],
}

impl TrackRecord {
    pub fn from_track(frame: u64, time_ms: f64, track: &Track) -> Self {
        Self {
            frame,
            time_ms,
            track_id: track.id,
            score: track.score,
            cls: track.class_id,
            bbox: track.bbox.to_array(),
        }
    }
}

/// 导出缓存
#[derive(Clone, Debug, Default)]
pub struct ExportBuffer {
    pub rows: Vec<TrackRecord>,
    pub events: Vec<InteractionEvent>,
}

impl ExportBuffer {
    pub fn push_tracks(&mut self, frame: u64, time_ms: f64, tracks: &[Track]) {
        self.rows
            .extend(tracks.iter().map(|t| TrackRecord::from_track(frame, time_ms, t)));
    }

    pub fn push_events(&mut self, events: &[InteractionEvent]) {
        self.events.extend_from_slice(events);
    }

    /// 按配置写出全部文件
    pub fn flush(&self, config: &ExportConfig) -> Result<()> {
        if let Some(path) = &config.json_path {
            ensure_parent(path)?;
            write_json(path, &self.rows)?;
            log::info!("💾 轨迹 JSON: {} ({} 行)", path.display(), self.rows.len());
        }
        if let Some(path) = &config.csv_path {
            ensure_parent(path)?;
            write_tracks_csv(path, &self.rows)?;
            log::info!("💾 轨迹 CSV: {} ({} 行)", path.display(), self.rows.len());
        }
        if let Some(path) = &config.events_path {
            ensure_parent(path)?;
            write_events(path, &self.events)?;
            log::info!("💾 事件: {} ({} 条)", path.display(), self.events.len());
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// JSON 数组 (空缓存写出 `[]`)
pub fn write_json<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, rows)
        .with_context(|| format!("写入 {} 失败", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// 轨迹 CSV; 没有记录时只创建空文件
pub fn write_tracks_csv(path: &Path, rows: &[TrackRecord]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", TRACK_CSV_HEADER)?;
    for r in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            r.frame, r.time_ms, r.track_id, r.score, r.cls, r.bbox[0], r.bbox[1], r.bbox[2], r.bbox[3]
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// 事件导出, 按扩展名选择 CSV 或 JSON
pub fn write_events(path: &Path, events: &[InteractionEvent]) -> Result<()> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        write_events_csv(path, events)
    } else {
        write_json(path, events)
    }
}

pub fn write_events_csv(path: &Path, events: &[InteractionEvent]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
    if events.is_empty() {
        return Ok(());
    }
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", EVENT_CSV_HEADER)?;
    for e in events {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            e.track_id,
            escape_csv(&e.roi_id),
            e.event_type,
            e.t_start,
            e.t_end,
            e.duration
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// 读回轨迹 CSV
pub fn read_tracks_csv(path: &Path) -> Result<Vec<TrackRecord>> {
    let text = fs::read_to_string(path).with_context(|| format!("无法读取 {}", path.display()))?;
    let mut lines = text.lines();
    match lines.next() {
        None => return Ok(Vec::new()),
        Some(header) if header.trim() == TRACK_CSV_HEADER => {}
        Some(header) => bail!("CSV 表头不匹配: {}", header),
    }

    let mut rows = Vec::new();
    for (n, line) in lines.enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let f: Vec<&str> = line.split(',').map(str::trim).collect();
        if f.len() != 9 {
            bail!("第 {} 行字段数错误: {}", n + 2, line);
        }
        let parse = || -> Result<TrackRecord> {
            Ok(TrackRecord {
                frame: f[0].parse()?,
                time_ms: f[1].parse()?,
                track_id: f[2].parse()?,
                score: f[3].parse()?,
                cls: f[4].parse()?,
                bbox: [f[5].parse()?, f[6].parse()?, f[7].parse()?, f[8].parse()?],
            })
        };
        rows.push(parse().with_context(|| format!("第 {} 行解析失败: {}", n + 2, line))?);
    }
    Ok(rows)
}

/// 读回 JSON 数组
pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let text = fs::read_to_string(path).with_context(|| format!("无法读取 {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析 {} 失败", path.display()))
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
