// ONNX Runtime 推理后端 (仅 CPU)

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::models::InferenceBackend;

/// ORT 会话封装
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    name: String,
}

impl OrtBackend {
    /// 加载模型
    ///
    /// 模型文件缺失、无法加载或没有输入/输出都视为致命错误
    pub fn build(model: &Path, intra_threads: usize) -> Result<Self> {
        if !model.is_file() {
            bail!("模型文件不存在: {}", model.display());
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model)
            .with_context(|| format!("加载ONNX模型失败: {}", model.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("模型没有输入: {}", model.display()))?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            bail!("模型没有输出: {}", model.display());
        }

        let name = model
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| model.display().to_string());

        log::info!(
            "✅ 模型加载成功: {} (输入 {}, 输出 {:?})",
            name,
            input_name,
            output_names
        );

        Ok(Self {
            session,
            input_name,
            output_names,
            name,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

impl InferenceBackend for OrtBackend {
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let input = Tensor::from_array(xs).context("创建输入张量失败")?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .with_context(|| format!("推理失败: {}", self.name))?;

        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in self.output_names.iter() {
            let y = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .with_context(|| format!("提取输出失败: {}", name))?;
            ys.push(y.into_owned());
        }
        Ok(ys)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
