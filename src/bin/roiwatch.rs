// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// ROI 交互分析 (ROI Watch)
///
/// 读取图片序列, 逐帧检测 + 跟踪, 输出 Approach / Pick / Leave 事件
///
/// 用法:
///   roiwatch --source frames/ --rois rois.json --export-events out/events.csv
use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;

use roiwatch_rs::config::{AppConfig, Args};
use roiwatch_rs::input::{FrameReader, ImageSequenceSource};
use roiwatch_rs::Pipeline;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AppConfig::from_args(&args)?;
    config.print_summary();

    log::info!("🚀 ROI Watch 启动");
    let mut pipeline = Pipeline::from_config(&config)?;

    if config.dry_run {
        log::info!(
            "✅ Dry run 完成: 模型与 {} 个 ROI 已加载, 配置有效",
            pipeline.regions().len()
        );
        return Ok(());
    }

    let source = ImageSequenceSource::open(&config.source)?;
    let mut reader = FrameReader::new(Box::new(source), &config.video);

    let summary = pipeline.run(&mut reader)?;
    log::info!(
        "🏁 完成: {} 帧, {} 个事件",
        summary.frames_processed,
        summary.events
    );
    Ok(())
}
