/// ROI 交互分析 (Interaction)
///
/// - roi:    区域定义、JSON 加载、点在多边形内判断
/// - engine: Approach / Pick / Leave 状态机
pub mod engine;
pub mod roi;

pub use engine::{EventType, InteractionEngine, InteractionEvent};
pub use roi::{load_regions, load_regions_lenient, parse_regions, Region};
