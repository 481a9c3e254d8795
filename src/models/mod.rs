/// 推理后端接口与模型输出解码
///
/// # 架构说明
///
/// ## 推理后端 (InferenceBackend)
/// - 只负责一次前向传播: NCHW 张量 → 原始输出张量
/// - 生产实现: `OrtBackend` (ONNX Runtime, CPU)
/// - 测试可注入内存实现
///
/// ## 预处理 / 后处理
/// - `letterbox.rs`: 等比缩放 + 114 灰色填充, 记录缩放比例和偏移
/// - `yolov8.rs`: 检测输出 / 姿态输出解码
///
/// ```text
/// 原始帧 → Letterbox::apply → NCHW张量
///          ↓
///     InferenceBackend::run
///          ↓
///     原始输出 → decode_detections / decode_pose → 原图坐标
/// ```
use anyhow::Result;
use clap::ValueEnum;
use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};

/// 推理引擎统一接口
pub trait InferenceBackend {
    /// 推理: 执行模型前向传播
    ///
    /// # Arguments
    /// * `xs` - 预处理后的张量 (NCHW)
    ///
    /// # Returns
    /// * `Vec<Array<f32, IxDyn>>` - 模型原始输出(未解码)
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后端名称 (日志用)
    fn name(&self) -> &str;
}

/// 检测模型输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 按每行字段数自动判断
    #[default]
    Auto,
    /// 每行 [x1,y1,x2,y2,score,cls] (已在 letterbox 坐标系)
    Xyxy,
    /// YOLOv8 原始输出 [4 + nc, N]: cx,cy,w,h + 各类别分数
    #[value(name = "yolov8")]
    #[serde(rename = "yolov8")]
    YoloV8,
}

pub mod letterbox;
pub mod yolov8;

pub use letterbox::Letterbox;
pub use yolov8::{decode_detections, decode_pose};
