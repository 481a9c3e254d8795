//! 检测器 (Detector)
//! 职责: RGB帧 → letterbox → 推理 → 解码 → 原图坐标检测框

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;

use super::types::Detection;
use crate::config::DetectorConfig;
use crate::models::{decode_detections, InferenceBackend, Letterbox};
use crate::OrtBackend;

pub struct Detector {
    backend: Box<dyn InferenceBackend>,
    config: DetectorConfig,

    // 统计
    last_inference_ms: f64,
}

impl Detector {
    /// 加载 ONNX 模型, 失败即返回错误
    pub fn new(model: &Path, config: DetectorConfig) -> Result<Self> {
        let backend = OrtBackend::build(model, config.intra_threads)
            .with_context(|| format!("❌ 检测模型加载失败: {}", model.display()))?;
        Ok(Self::with_backend(Box::new(backend), config))
    }

    /// 使用已构建的推理后端
    pub fn with_backend(backend: Box<dyn InferenceBackend>, config: DetectorConfig) -> Self {
        log::info!(
            "🔍 检测器: {} (imgsz={}, conf={:.2}, iou={:.2})",
            backend.name(),
            config.imgsz,
            config.conf,
            config.iou
        );
        Self {
            backend,
            config,
            last_inference_ms: 0.0,
        }
    }

    /// 单帧检测
    ///
    /// 推理失败向上传递; 输出形状不符合预期时返回空列表
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (w0, h0) = image.dimensions();
        let (xs, letterbox) = Letterbox::apply(image, self.config.imgsz)?;

        let t_run = Instant::now();
        let ys = self.backend.run(xs.into_dyn())?;
        self.last_inference_ms = t_run.elapsed().as_secs_f64() * 1000.0;

        let Some(output) = ys.first() else {
            log::debug!("⚠️ 模型没有返回输出");
            return Ok(Vec::new());
        };

        let mut detections = decode_detections(
            output,
            self.config.format,
            self.config.conf,
            self.config.iou,
            &letterbox,
            w0,
            h0,
        );

        // 类别白名单
        if !self.config.classes.is_empty() {
            detections.retain(|d| self.config.classes.contains(&d.class_id));
        }

        Ok(detections)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 最近一次推理耗时 (毫秒)
    pub fn last_inference_ms(&self) -> f64 {
        self.last_inference_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use ndarray::{Array, IxDyn};

    /// 固定输出的假后端, 记录输入形状
    struct FixedBackend {
        rows: Vec<[f32; 6]>,
        seen: Vec<Vec<usize>>,
    }

    impl InferenceBackend for FixedBackend {
        fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
            self.seen.push(xs.shape().to_vec());
            let flat: Vec<f32> = self.rows.iter().flatten().copied().collect();
            Ok(vec![Array::from_shape_vec((1, self.rows.len(), 6), flat)?.into_dyn()])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn run(&mut self, _xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
            bail!("boom")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn config(imgsz: u32) -> DetectorConfig {
        DetectorConfig {
            imgsz,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn detections_are_in_frame_coordinates() {
        let backend = FixedBackend {
            rows: vec![[8., 18., 24., 34., 0.9, 0.]],
            seen: Vec::new(),
        };
        // 64x32 → 32: scale 0.5, pad_y 8
        let mut detector = Detector::with_backend(Box::new(backend), config(32));
        let dets = detector.detect(&RgbImage::new(64, 32)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox.to_array(), [16., 20., 48., 32.]);
    }

    #[test]
    fn class_filter_applies() {
        let backend = FixedBackend {
            rows: vec![[0., 0., 10., 10., 0.9, 0.], [20., 20., 30., 30., 0.8, 3.]],
            seen: Vec::new(),
        };
        let cfg = DetectorConfig {
            imgsz: 32,
            classes: vec![3],
            ..DetectorConfig::default()
        };
        let mut detector = Detector::with_backend(Box::new(backend), cfg);
        let dets = detector.detect(&RgbImage::new(32, 32)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 3);
    }

    #[test]
    fn backend_error_propagates() {
        let mut detector = Detector::with_backend(Box::new(FailingBackend), config(32));
        assert!(detector.detect(&RgbImage::new(32, 32)).is_err());
    }

    #[test]
    fn missing_model_is_fatal() {
        assert!(Detector::new(Path::new("/nonexistent/model.onnx"), DetectorConfig::default()).is_err());
    }
}
