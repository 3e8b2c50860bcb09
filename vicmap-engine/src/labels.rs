//! 道路标注的位置与朝向：中点、正向可读的旋转角、垂直偏移。

use vicmap_core::geometry::{LinePath, Point2, Shape, Vector2};

/// 有向线段的方位角（度），范围 `[0, 360)`，x 轴正向为 0、逆时针为正。
pub fn bearing(start: Point2, end: Point2) -> f64 {
    let delta = start.vector_to(end);
    normalize_degrees(delta.y().atan2(delta.x()).to_degrees())
}

/// 方位角落在 `(90, 270]` 时翻转 180°，保证文字不会倒置。
pub fn upright(angle: f64) -> f64 {
    let angle = normalize_degrees(angle);
    if angle > 90.0 && angle <= 270.0 {
        normalize_degrees(angle + 180.0)
    } else {
        angle
    }
}

/// 沿 `rotation + 90°` 方向移动 `offset`。
pub fn offset_point(midpoint: Point2, rotation: f64, offset: f64) -> Point2 {
    midpoint.translate(Vector2::from_angle_degrees(rotation + 90.0, offset))
}

fn normalize_degrees(angle: f64) -> f64 {
    let normalized = angle.rem_euclid(360.0);
    // 极小的负数取模后会得到 360
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// 单个几何的标注锚点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelAnchor {
    pub insert: Point2,
    pub midpoint: Point2,
    pub rotation: f64,
    /// 承载标注的部分在 `Shape::label_parts` 中的序号。
    pub part_index: usize,
}

impl LabelAnchor {
    /// 多部分几何取最长的部分（等长时取靠前者）；全部退化时返回 `None`。
    pub fn compute(shape: &Shape, offset: f64) -> Option<Self> {
        let (part_index, part) = longest_part(&shape.label_parts())?;
        let midpoint = part.interpolate(0.5)?;
        let (start, end) = (part.start()?, part.end()?);
        let rotation = upright(bearing(start, end));
        Some(Self {
            insert: offset_point(midpoint, rotation, offset),
            midpoint,
            rotation,
            part_index,
        })
    }
}

fn longest_part<'a>(parts: &[&'a LinePath]) -> Option<(usize, &'a LinePath)> {
    let mut best: Option<(usize, &'a LinePath, f64)> = None;
    for (index, &part) in parts.iter().enumerate() {
        if part.is_degenerate() {
            continue;
        }
        let length = part.length();
        match best {
            Some((_, _, best_length)) if length <= best_length => {}
            _ => best = Some((index, part, length)),
        }
    }
    best.map(|(index, part, _)| (index, part))
}

/// 一条待绘制的文字标注；字高与样式在组装图纸时统一确定。
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPlacement {
    pub text: String,
    pub insert: Point2,
    pub rotation: f64,
    pub part_index: usize,
}

/// 以固定偏移量为几何生成标注，纯函数且结果确定。
#[derive(Debug, Clone, Copy)]
pub struct LabelPlacer {
    offset: f64,
}

impl LabelPlacer {
    pub fn new(offset: f64) -> Self {
        Self { offset }
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn place(&self, text: &str, shape: &Shape) -> Option<LabelPlacement> {
        let anchor = LabelAnchor::compute(shape, self.offset)?;
        Some(LabelPlacement {
            text: text.to_string(),
            insert: anchor.insert,
            rotation: anchor.rotation,
            part_index: anchor.part_index,
        })
    }
}
