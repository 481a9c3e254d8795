/// 帧输入系统 (Frame Input System)
///
/// 顺序读取, 读完即结束
/// - FrameSource: 帧源接口 (视频解码器在此接入)
/// - ImageSequenceSource: 图片目录 / 单张图片
/// - FrameReader: 隔帧抽取 + 最大帧数限制
pub mod image_sequence;

pub use image_sequence::ImageSequenceSource;

use anyhow::Result;
use image::RgbImage;

use crate::config::VideoConfig;

/// 一帧输入
#[derive(Clone, Debug)]
pub struct Frame {
    /// 源内原始帧序号 (从 0 开始, 含被跳过的帧)
    pub index: u64,
    pub image: RgbImage,
    /// 采集时间戳 (毫秒), 源不提供时为 None
    pub timestamp_ms: Option<f64>,
}

/// 帧源统一接口
pub trait FrameSource {
    /// 读取下一帧, 结束时返回 None
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// 名义帧率 (已知时)
    fn fps(&self) -> Option<f64>;
}

/// 帧读取器: 每 N 帧取一帧, 最多输出 max_frames 帧
pub struct FrameReader {
    source: Box<dyn FrameSource>,
    every_n: u64,
    max_frames: Option<u64>,
    fps_override: Option<f64>,
    raw_count: u64,
    yielded: u64,
}

impl FrameReader {
    pub fn new(source: Box<dyn FrameSource>, video: &VideoConfig) -> Self {
        Self {
            source,
            every_n: video.every_n.max(1) as u64,
            // 0 表示不限制
            max_frames: video.max_frames.filter(|&m| m > 0),
            fps_override: video.fps,
            raw_count: 0,
            yielded: 0,
        }
    }

    /// 下一帧 (已抽帧)
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(max) = self.max_frames {
            if self.yielded >= max {
                return Ok(None);
            }
        }
        loop {
            let Some(mut frame) = self.source.next_frame()? else {
                return Ok(None);
            };
            let raw = self.raw_count;
            self.raw_count += 1;
            if raw % self.every_n != 0 {
                continue;
            }
            // 非正时间戳视为未知
            frame.timestamp_ms = frame.timestamp_ms.filter(|&t| t > 0.0);
            self.yielded += 1;
            return Ok(Some(frame));
        }
    }

    /// 帧率: 配置覆盖 > 源报告
    pub fn fps(&self) -> Option<f64> {
        self.fps_override.or_else(|| self.source.fps())
    }

    /// 已读取的原始帧数 (含跳过的)
    pub fn frames_seen(&self) -> u64 {
        self.raw_count
    }

    /// 已输出帧数
    pub fn frames_yielded(&self) -> u64 {
        self.yielded
    }
}
