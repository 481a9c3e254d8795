//! 姿态估计 (Pose Estimator)
//! 仅用于细化 Pick 判定: 手腕关键点是否落在 ROI 内

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::types::PoseResult;
use crate::config::PoseConfig;
use crate::models::{decode_pose, InferenceBackend, Letterbox};
use crate::OrtBackend;

pub struct PoseEstimator {
    backend: Box<dyn InferenceBackend>,
    imgsz: u32,
    last_inference_ms: f64,
}

impl PoseEstimator {
    /// 加载姿态模型
    pub fn new(model: &Path, config: &PoseConfig) -> Result<Self> {
        let backend = OrtBackend::build(model, config.intra_threads)
            .with_context(|| format!("姿态模型加载失败: {}", model.display()))?;
        Ok(Self::with_backend(Box::new(backend), config.imgsz))
    }

    pub fn with_backend(backend: Box<dyn InferenceBackend>, imgsz: u32) -> Self {
        log::info!("🦴 姿态估计: {} (imgsz={})", backend.name(), imgsz);
        Self {
            backend,
            imgsz,
            last_inference_ms: 0.0,
        }
    }

    /// 单帧姿态估计, 关键点映射回原图坐标
    pub fn estimate(&mut self, image: &RgbImage) -> Result<PoseResult> {
        let (xs, letterbox) = Letterbox::apply(image, self.imgsz)?;

        let t_run = Instant::now();
        let ys = self.backend.run(xs.into_dyn())?;
        self.last_inference_ms = t_run.elapsed().as_secs_f64() * 1000.0;

        let output = ys.first().ok_or_else(|| anyhow!("姿态模型没有返回输出"))?;
        decode_pose(output, &letterbox)
    }

    pub fn last_inference_ms(&self) -> f64 {
        self.last_inference_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array2, IxDyn};

    struct WristBackend;

    impl InferenceBackend for WristBackend {
        fn run(&mut self, _xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
            let mut kpts = Array2::<f32>::zeros((17, 3));
            kpts[[10, 0]] = 16.;
            kpts[[10, 1]] = 16.;
            kpts[[10, 2]] = 0.8;
            Ok(vec![kpts.into_dyn()])
        }

        fn name(&self) -> &str {
            "wrist"
        }
    }

    struct EmptyBackend;

    impl InferenceBackend for EmptyBackend {
        fn run(&mut self, _xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    #[test]
    fn keypoints_come_back_in_frame_coordinates() {
        let mut pose = PoseEstimator::with_backend(Box::new(WristBackend), 32);
        // 64x64 → 32: scale 0.5, 无填充
        let result = pose.estimate(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(result.points.len(), 17);
        assert_eq!(result.wrists()[1], (32., 32., 0.8));
    }

    #[test]
    fn missing_output_is_an_error() {
        let mut pose = PoseEstimator::with_backend(Box::new(EmptyBackend), 32);
        assert!(pose.estimate(&RgbImage::new(8, 8)).is_err());
    }
}
