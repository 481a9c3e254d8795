//! ROI 区域定义与加载

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

/// 多边形区域 (隐式闭合, 至少 3 个点)
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: String,
    pub points: Vec<(f32, f32)>,
}

impl Region {
    pub fn new(id: impl Into<String>, points: Vec<(f32, f32)>) -> Result<Self> {
        let id = id.into();
        if points.len() < 3 {
            bail!("ROI {} 至少需要 3 个点, 实际 {}", id, points.len());
        }
        Ok(Self { id, points })
    }

    /// 矩形 → 顺时针四个角点
    pub fn from_rect(id: impl Into<String>, rect: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = rect;
        Self {
            id: id.into(),
            points: vec![(x1, y1), (x2, y1), (x2, y2), (x1, y2)],
        }
    }

    /// 射线法判断点是否在多边形内
    ///
    /// 半开规则: 左/下边界算内部, 右/上边界算外部
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.points[i];
            let (xj, yj) = self.points[j];
            // 分母加 epsilon 防止水平边除零
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi + 1e-9) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

// ========== JSON 加载 ==========

/// id 可以是字符串或数字
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> Option<String> {
        match self {
            RawId::Text(s) if s.is_empty() => None,
            RawId::Text(s) => Some(s),
            RawId::Number(n) => Some(n.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct RawRegion {
    id: Option<RawId>,
    name: Option<RawId>,
    points: Option<Vec<[f32; 2]>>,
    rect: Option<[f32; 4]>,
}

impl RawRegion {
    fn into_region(self, index: usize) -> Result<Region> {
        let id = self
            .id
            .and_then(RawId::into_string)
            .or_else(|| self.name.and_then(RawId::into_string))
            .ok_or_else(|| anyhow!("第 {} 个 ROI 缺少 'id' 或 'name'", index))?;

        match (self.points, self.rect) {
            (Some(points), _) => Region::new(id, points.into_iter().map(|[x, y]| (x, y)).collect()),
            (None, Some(rect)) => Ok(Region::from_rect(id, rect)),
            (None, None) => bail!("ROI {} 必须包含 'points' 或 'rect'", id),
        }
    }
}

/// 从 JSON 文本解析 ROI 列表
///
/// 交互状态按 (轨迹, 区域 id) 记录, id 必须唯一
pub fn parse_regions(json: &str) -> Result<Vec<Region>> {
    let raw: Vec<RawRegion> = serde_json::from_str(json).context("ROI 文件不是合法的 JSON 数组")?;
    let regions = raw
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.into_region(i))
        .collect::<Result<Vec<Region>>>()?;

    let mut seen = HashSet::new();
    for region in &regions {
        if !seen.insert(region.id.as_str()) {
            bail!("ROI id 重复: {}", region.id);
        }
    }
    Ok(regions)
}

/// 加载 ROI 文件 (严格: 任何错误都返回)
pub fn load_regions(path: &Path) -> Result<Vec<Region>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("ROI 文件无法读取: {}", path.display()))?;
    parse_regions(&json).with_context(|| format!("ROI 文件解析失败: {}", path.display()))
}

/// 加载 ROI 文件 (宽松: 文件不可读是错误, 内容有误则告警并返回空列表)
pub fn load_regions_lenient(path: &Path) -> Result<Vec<Region>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("ROI 文件无法读取: {}", path.display()))?;
    match parse_regions(&json) {
        Ok(regions) => {
            log::info!("📐 已加载 {} 个 ROI: {}", regions.len(), path.display());
            Ok(regions)
        }
        Err(e) => {
            log::warn!("⚠️ ROI 文件内容有误, 不做区域分析: {:#}", e);
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Region {
        Region::new("sq", vec![(0., 0.), (1., 0.), (1., 1.), (0., 1.)]).unwrap()
    }

    #[test]
    fn point_in_unit_square() {
        let sq = unit_square();
        assert!(sq.contains(0.5, 0.5));
        assert!(!sq.contains(2.0, 2.0));
        assert!(!sq.contains(-0.5, 0.5));
    }

    #[test]
    fn edges_follow_half_open_rule() {
        let sq = unit_square();
        assert!(sq.contains(0.0, 0.5)); // 左
        assert!(sq.contains(0.5, 0.0)); // 下
        assert!(!sq.contains(1.0, 0.5)); // 右
        assert!(!sq.contains(0.5, 1.0)); // 上
    }

    #[test]
    fn concave_polygon() {
        // L 形
        let l = Region::new(
            "l",
            vec![(0., 0.), (4., 0.), (4., 1.), (1., 1.), (1., 4.), (0., 4.)],
        )
        .unwrap();
        assert!(l.contains(0.5, 3.0));
        assert!(l.contains(3.0, 0.5));
        assert!(!l.contains(3.0, 3.0));
    }

    #[test]
    fn parses_points_rect_and_aliases() {
        let json = r#"[
            {"id": "shelf", "points": [[0,0],[10,0],[10,10]]},
            {"name": "door", "rect": [1, 2, 3, 4]},
            {"id": 7, "rect": [0, 0, 1, 1]}
        ]"#;
        let regions = parse_regions(json).unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].id, "shelf");
        assert_eq!(regions[1].id, "door");
        assert_eq!(regions[1].points, vec![(1., 2.), (3., 2.), (3., 4.), (1., 4.)]);
        assert_eq!(regions[2].id, "7");
    }

    #[test]
    fn invalid_definitions_are_errors() {
        assert!(parse_regions(r#"[{"points": [[0,0],[1,0],[1,1]]}]"#).is_err());
        assert!(parse_regions(r#"[{"id": "a"}]"#).is_err());
        assert!(parse_regions(r#"[{"id": "a", "points": [[0,0],[1,1]]}]"#).is_err());
        assert!(parse_regions(r#"{"id": "a"}"#).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"[
            {"id": "shelf", "rect": [0, 0, 100, 100]},
            {"id": "shelf", "rect": [200, 0, 300, 100]}
        ]"#;
        assert!(parse_regions(json).is_err());
        // 数字 id 与字符串 id 字符串化后相同
        assert!(parse_regions(r#"[{"id": 1, "rect": [0,0,1,1]}, {"name": "1", "rect": [2,2,3,3]}]"#).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.json");
        fs::write(&path, json).unwrap();
        assert!(load_regions_lenient(&path).unwrap().is_empty());
    }

    #[test]
    fn lenient_loading() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_regions_lenient(&missing).is_err());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "[{\"id\": 1}]").unwrap();
        assert!(load_regions_lenient(&broken).unwrap().is_empty());
        assert!(load_regions(&broken).is_err());

        let good = dir.path().join("good.json");
        fs::write(&good, r#"[{"id": "a", "rect": [0,0,5,5]}]"#).unwrap();
        assert_eq!(load_regions_lenient(&good).unwrap().len(), 1);
    }
}
