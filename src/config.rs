//! 运行配置
//!
//! 命令行参数 (clap) + 模式预设 + JSON 调参文件 (跟踪/交互阈值)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::models::OutputFormat;

/// 源未报告帧率时使用的默认帧率
pub const FALLBACK_FPS: f64 = 30.0;

/// ROI 交互分析
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "ROI交互分析 (检测 + 跟踪 + Approach/Pick/Leave)", long_about = None)]
pub struct Args {
    /// 检测模型 ONNX 文件
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// 输入帧: 图片目录或单张图片
    #[arg(short, long)]
    pub source: PathBuf,

    /// 标注帧输出目录 (不指定则不写)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 运行模式: fast 或 quality
    #[arg(long, value_enum, default_value_t = Mode::Fast)]
    pub mode: Mode,

    /// 置信度阈值 (覆盖模式预设)
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IoU 阈值 (覆盖模式预设)
    #[arg(long)]
    pub iou: Option<f32>,

    /// 推理尺寸 (覆盖模式预设)
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// 每 N 帧处理一帧 (覆盖模式预设)
    #[arg(long)]
    pub every_n: Option<u32>,

    /// 最多处理帧数
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// 源帧率 (图片序列没有帧率信息)
    #[arg(long)]
    pub fps: Option<f64>,

    /// 检测输出格式
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    pub format: OutputFormat,

    /// 只保留这些类别 (逗号分隔, 如 0 只跟踪人)
    #[arg(long, value_delimiter = ',')]
    pub classes: Vec<u32>,

    /// ORT 线程数
    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    /// ROI 定义文件 (JSON)
    #[arg(long)]
    pub rois: Option<PathBuf>,

    /// 姿态模型 ONNX 文件 (可选)
    #[arg(long)]
    pub pose_model: Option<PathBuf>,

    /// 姿态模型推理尺寸
    #[arg(long, default_value_t = 640)]
    pub pose_imgsz: u32,

    /// 轨迹导出 JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// 轨迹导出 CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// 事件导出 (.json 或 .csv)
    #[arg(long)]
    pub export_events: Option<PathBuf>,

    /// 标签字体 (TTF/OTF, 不指定则不画文字)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 调参文件 (跟踪/交互阈值), 不存在时自动创建
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// 只加载模型和ROI做校验, 不处理帧
    #[arg(long)]
    pub dry_run: bool,
}

/// 运行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// 速度优先
    Fast,
    /// 精度优先
    Quality,
}

impl Mode {
    /// 模式预设 (视频 + 检测)
    pub fn defaults(&self) -> (VideoConfig, DetectorConfig) {
        match self {
            Mode::Fast => (
                VideoConfig {
                    every_n: 2,
                    ..VideoConfig::default()
                },
                DetectorConfig {
                    conf: 0.23,
                    iou: 0.45,
                    imgsz: 640,
                    ..DetectorConfig::default()
                },
            ),
            Mode::Quality => (
                VideoConfig {
                    every_n: 1,
                    ..VideoConfig::default()
                },
                DetectorConfig {
                    conf: 0.28,
                    iou: 0.5,
                    imgsz: 896,
                    ..DetectorConfig::default()
                },
            ),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Fast => write!(f, "fast"),
            Mode::Quality => write!(f, "quality"),
        }
    }
}

// ========== 分项配置 ==========

/// 帧输入参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub every_n: u32,
    pub max_frames: Option<u64>,
    /// 覆盖源报告的帧率
    pub fps: Option<f64>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            every_n: 2,
            max_frames: None,
            fps: None,
        }
    }
}

/// 检测参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub conf: f32,
    pub iou: f32,
    pub imgsz: u32,
    pub format: OutputFormat,
    /// 类别白名单, 空表示全部保留
    pub classes: Vec<u32>,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            conf: 0.25,
            iou: 0.45,
            imgsz: 640,
            format: OutputFormat::Auto,
            classes: Vec::new(),
            intra_threads: 1,
        }
    }
}

/// 姿态估计参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    pub model: Option<PathBuf>,
    pub imgsz: u32,
    pub intra_threads: usize,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model: None,
            imgsz: 640,
            intra_threads: 1,
        }
    }
}

/// 跟踪器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_missed: u32,  // 最大丢失帧数
    pub min_hits: u32,    // 最少命中次数
    pub iou_match: f32,   // 匹配IoU阈值
    pub history: usize,   // 历史框长度
    /// 新轨迹在存活 min_hits 次更新前不做命中数剪除
    pub defer_new_track_pruning: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_missed: 30,
            min_hits: 1,
            iou_match: 0.3,
            history: 30,
            defer_new_track_pruning: false,
        }
    }
}

/// ROI 交互参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub approach_seconds: f64, // 停留多久算 Approach
    pub pick_area_delta: f32,  // 面积相对变化阈值
    pub pose_conf: f32,        // 手腕关键点置信度阈值
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            approach_seconds: 1.0,
            pick_area_delta: 0.25,
            pose_conf: 0.5,
        }
    }
}

/// 导出路径
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub json_path: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
}

impl ExportConfig {
    /// 运行日志放在第一个导出文件旁边
    pub fn run_log_path(&self) -> Option<PathBuf> {
        [&self.json_path, &self.csv_path, &self.events_path]
            .into_iter()
            .flatten()
            .next()
            .map(|p| p.with_file_name("run_log.txt"))
    }
}

// ========== 调参文件 ==========

/// 调参文件 - 通过JSON文件调整跟踪和交互阈值
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningParams {
    pub tracker: TrackerConfig,
    pub interaction: InteractionConfig,
}

impl TuningParams {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出默认配置; 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(params) => {
                    log::info!("✅ 调参文件已从 {} 加载", path.display());
                    params
                }
                Err(e) => {
                    log::warn!("⚠️ 调参文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 调参文件不存在,创建默认配置...");
                let params = Self::default();
                if let Err(e) = params.save(path) {
                    log::warn!("❌ 保存调参文件失败: {:#}", e);
                }
                params
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("序列化调参文件失败")?;
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        log::info!("💾 调参文件已保存到 {}", path.display());
        Ok(())
    }
}

// ========== 汇总配置 ==========

/// 一次运行的完整配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: Mode,
    pub model_path: PathBuf,
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub rois: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub video: VideoConfig,
    pub detector: DetectorConfig,
    pub pose: PoseConfig,
    pub tracker: TrackerConfig,
    pub interaction: InteractionConfig,
    pub export: ExportConfig,
    pub dry_run: bool,
}

impl AppConfig {
    /// 模式预设, 其余取默认值
    pub fn for_mode(mode: Mode) -> Self {
        let (video, detector) = mode.defaults();
        Self {
            mode,
            model_path: PathBuf::from("models/yolov8n.onnx"),
            source: PathBuf::new(),
            output: None,
            rois: None,
            font: None,
            video,
            detector,
            pose: PoseConfig::default(),
            tracker: TrackerConfig::default(),
            interaction: InteractionConfig::default(),
            export: ExportConfig::default(),
            dry_run: false,
        }
    }

    /// 命令行参数 → 配置 (显式参数覆盖模式预设)
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self::for_mode(args.mode);

        config.model_path = args.model.clone();
        config.source = args.source.clone();
        config.output = args.output.clone();
        config.rois = args.rois.clone();
        config.font = args.font.clone();
        config.dry_run = args.dry_run;

        if let Some(conf) = args.conf {
            config.detector.conf = conf;
        }
        if let Some(iou) = args.iou {
            config.detector.iou = iou;
        }
        if let Some(imgsz) = args.imgsz {
            config.detector.imgsz = imgsz;
        }
        config.detector.format = args.format;
        config.detector.classes = args.classes.clone();
        config.detector.intra_threads = args.threads;

        if let Some(every_n) = args.every_n {
            config.video.every_n = every_n;
        }
        config.video.max_frames = args.max_frames;
        config.video.fps = args.fps;

        config.pose.model = args.pose_model.clone();
        config.pose.imgsz = args.pose_imgsz;
        config.pose.intra_threads = args.threads;

        config.export = ExportConfig {
            json_path: args.export_json.clone(),
            csv_path: args.export_csv.clone(),
            events_path: args.export_events.clone(),
        };

        if let Some(path) = &args.params {
            let params = TuningParams::load(path);
            config.tracker = params.tracker;
            config.interaction = params.interaction;
        }

        config.validate()?;
        Ok(config)
    }

    /// 参数合法性检查
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detector.conf) {
            bail!("conf 必须在 [0,1] 内: {}", self.detector.conf);
        }
        if !(0.0..=1.0).contains(&self.detector.iou) {
            bail!("iou 必须在 [0,1] 内: {}", self.detector.iou);
        }
        if self.detector.imgsz == 0 || self.pose.imgsz == 0 {
            bail!("推理尺寸必须大于 0");
        }
        if self.video.every_n == 0 {
            bail!("every_n 必须大于 0");
        }
        if let Some(fps) = self.video.fps {
            if fps <= 0.0 {
                bail!("fps 必须大于 0: {}", fps);
            }
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        log::info!("🎛️  当前配置 (mode={}):", self.mode);
        log::info!(
            "  检测: conf={:.2} iou={:.2} imgsz={} format={:?}",
            self.detector.conf,
            self.detector.iou,
            self.detector.imgsz,
            self.detector.format
        );
        log::info!(
            "  跟踪: max_missed={} min_hits={} iou_match={:.2}",
            self.tracker.max_missed,
            self.tracker.min_hits,
            self.tracker.iou_match
        );
        log::info!(
            "  交互: approach={:.1}s pick_area_delta={:.2} pose_conf={:.2}",
            self.interaction.approach_seconds,
            self.interaction.pick_area_delta,
            self.interaction.pose_conf
        );
        log::info!(
            "  视频: every_n={} max_frames={:?}",
            self.video.every_n,
            self.video.max_frames
        );
    }
}
