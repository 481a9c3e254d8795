// YOLOv8 输出解码
// 包含: 检测输出 (xyxy 行 / 原始 cxcywh+类别分数), 姿态输出 (K×3 / 原始 pose 头)

use anyhow::{bail, Result};
use ndarray::{s, Array, ArrayView2, Axis, Ix2, IxDyn};

use super::{Letterbox, OutputFormat};
use crate::detection::{BBox, Detection, PoseResult, COCO_CLASSES};
use crate::non_max_suppression;

const CXYWH_OFFSET: usize = 4;
const KPT_STEP: usize = 3;
/// xyxy 格式每行最少字段数: x1,y1,x2,y2,score,cls
const XYXY_FIELDS: usize = 6;
/// COCO 检测头通道数: 4 + 80
const COCO_CHANNELS: usize = CXYWH_OFFSET + COCO_CLASSES.len();

/// 去掉 batch 维, 只接受二维结果
fn squeeze_2d(output: &Array<f32, IxDyn>) -> Option<ArrayView2<'_, f32>> {
    let view = output.view();
    let view = match view.ndim() {
        3 if view.shape()[0] >= 1 => view.index_axis_move(Axis(0), 0),
        2 => view,
        _ => return None,
    };
    view.into_dimensionality::<Ix2>().ok()
}

/// 根据每行字段数推断格式
fn resolve_format(format: OutputFormat, cols: usize) -> Option<OutputFormat> {
    match format {
        OutputFormat::Auto if cols < XYXY_FIELDS => None,
        OutputFormat::Auto if cols <= XYXY_FIELDS + 1 => Some(OutputFormat::Xyxy),
        OutputFormat::Auto => Some(OutputFormat::YoloV8),
        OutputFormat::Xyxy if cols < XYXY_FIELDS => None,
        f => Some(f),
    }
}

/// 检测后处理: 原始输出 → 原图坐标检测框
///
/// 低于 `conf` 的候选丢弃, 贪心 NMS 后还原 letterbox 并裁剪到帧内。
/// 形状不符合预期时返回空列表。
pub fn decode_detections(
    output: &Array<f32, IxDyn>,
    format: OutputFormat,
    conf: f32,
    iou: f32,
    letterbox: &Letterbox,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    let Some(preds) = squeeze_2d(output) else {
        log::debug!("⚠️ 检测输出维度不支持: {:?}", output.shape());
        return Vec::new();
    };
    let Some(format) = resolve_format(format, preds.ncols()) else {
        log::debug!("⚠️ 检测输出字段不足: {:?}", output.shape());
        return Vec::new();
    };

    let mut data = match format {
        OutputFormat::YoloV8 => decode_raw(preds, conf),
        _ => decode_xyxy(preds, conf),
    };
    if data.is_empty() {
        return data;
    }

    non_max_suppression(&mut data, iou);

    for det in data.iter_mut() {
        det.bbox = letterbox.unmap_box(&det.bbox, width, height);
    }
    data
}

/// 每行 [x1,y1,x2,y2,score,cls,...]
fn decode_xyxy(preds: ArrayView2<'_, f32>, conf: f32) -> Vec<Detection> {
    preds
        .axis_iter(Axis(0))
        .filter(|row| row[4] >= conf)
        .map(|row| {
            let class_id = row[5].max(0.0) as u32;
            Detection::new(BBox::new(row[0], row[1], row[2], row[3]), row[4], class_id)
        })
        .collect()
}

/// YOLOv8 原始输出 [4 + nc, N] 或 [N, 4 + nc]
///
/// 有一维等于 COCO 通道数时按它定方向 (小输入尺寸下 N 可能少于通道数),
/// 否则候选数多于通道数时视为 [N, 4 + nc]
fn decode_raw(preds: ArrayView2<'_, f32>, conf: f32) -> Vec<Detection> {
    let transpose = match (preds.nrows() == COCO_CHANNELS, preds.ncols() == COCO_CHANNELS) {
        (true, _) => false,
        (false, true) => true,
        (false, false) => preds.nrows() > preds.ncols(),
    };
    let preds = if transpose { preds.reversed_axes() } else { preds };
    if preds.nrows() <= CXYWH_OFFSET {
        return Vec::new();
    }

    let mut data = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        if confidence < conf {
            continue;
        }

        data.push(Detection::new(
            BBox::from_cxcywh(bbox[0], bbox[1], bbox[2], bbox[3]),
            confidence,
            id as u32,
        ));
    }
    data
}

/// 姿态后处理: 原始输出 → 原图坐标关键点
///
/// 支持 `[K,3]` (batch 维可选) 和 YOLOv8-pose `[5 + 3K, N]` (取最高分候选)。
/// 关键点只做反 letterbox, 不裁剪。
pub fn decode_pose(output: &Array<f32, IxDyn>, letterbox: &Letterbox) -> Result<PoseResult> {
    let Some(preds) = squeeze_2d(output) else {
        bail!("姿态输出维度不支持: {:?}", output.shape());
    };

    // [K, 3]
    if preds.ncols() == KPT_STEP {
        let points = preds
            .axis_iter(Axis(0))
            .map(|kpt| {
                let (x, y) = letterbox.unmap_point(kpt[0], kpt[1]);
                (x, y, kpt[2])
            })
            .collect();
        return Ok(PoseResult::new(points));
    }

    // [5 + 3K, N] 或 [N, 5 + 3K]
    let is_pose_head = |c: usize| c > CXYWH_OFFSET + 1 && (c - CXYWH_OFFSET - 1) % KPT_STEP == 0;
    let preds = if is_pose_head(preds.nrows()) {
        preds
    } else if is_pose_head(preds.ncols()) {
        preds.reversed_axes()
    } else {
        bail!("姿态输出形状不支持: {:?}", output.shape());
    };

    let nk = (preds.nrows() - CXYWH_OFFSET - 1) / KPT_STEP;
    let best = preds
        .row(CXYWH_OFFSET)
        .iter()
        .enumerate()
        .reduce(|max, x| if x.1 > max.1 { x } else { max })
        .map(|(i, _)| i);
    let Some(best) = best else {
        return Ok(PoseResult::default());
    };

    let pred = preds.column(best);
    let kpts = pred.slice(s![CXYWH_OFFSET + 1..]);
    let points = (0..nk)
        .map(|i| {
            let (x, y) = letterbox.unmap_point(kpts[KPT_STEP * i], kpts[KPT_STEP * i + 1]);
            (x, y, kpts[KPT_STEP * i + 2])
        })
        .collect();
    Ok(PoseResult::new(points))
}
