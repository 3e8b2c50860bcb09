//! 按分析范围裁剪几何，布尔运算交给 `geo`。

use std::panic::{self, AssertUnwindSafe};

use geo::{BooleanOps, Coord, LineString, MultiLineString, MultiPolygon, Polygon};
use thiserror::Error;
use vicmap_core::geometry::{LENGTH_EPSILON, LinePath, Point2, PolygonShape, Shape};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClipError {
    #[error("geometry contains non-finite coordinates")]
    NonFinite,
    #[error("boolean operation failed: {0}")]
    Failed(String),
}

/// 裁剪函数签名。道路与洪水线阶段通过它调用裁剪，失败时保留未裁剪几何。
pub type ClipFn = fn(&Shape, &PolygonShape) -> Result<Option<Shape>, ClipError>;

/// 裁剪到 `area` 内部；完全落在范围外时返回 `Ok(None)`。
pub fn clip_to_area(shape: &Shape, area: &PolygonShape) -> Result<Option<Shape>, ClipError> {
    if !shape.is_finite() || !area.exterior.points().iter().all(|point| point.is_finite()) {
        return Err(ClipError::NonFinite);
    }
    match shape.bounds() {
        Some(bounds) if bounds.intersects(&area.exterior.bounds()) => {}
        _ => return Ok(None),
    }

    let area = to_geo_polygon(area);
    match shape {
        Shape::Line(_) | Shape::MultiLine(_) => clip_lines(shape.paths(), area),
        Shape::Polygon(polygon) => clip_polygons(std::slice::from_ref(polygon), area),
        Shape::MultiPolygon(polygons) => clip_polygons(polygons, area),
    }
}

fn clip_lines(paths: Vec<&LinePath>, area: Polygon<f64>) -> Result<Option<Shape>, ClipError> {
    let lines = MultiLineString::new(paths.into_iter().map(to_geo_line).collect());
    let clipped = guarded(|| area.clip(&lines, false))?;
    Ok(Shape::from_lines(
        clipped
            .0
            .iter()
            .filter_map(from_geo_line)
            .filter(|path| !path.is_degenerate())
            .collect(),
    ))
}

fn clip_polygons(
    polygons: &[PolygonShape],
    area: Polygon<f64>,
) -> Result<Option<Shape>, ClipError> {
    let subject = MultiPolygon::new(polygons.iter().map(to_geo_polygon).collect());
    let window = MultiPolygon::new(vec![area]);
    let clipped = guarded(|| subject.intersection(&window))?;
    Ok(Shape::from_polygons(
        clipped.0.iter().filter_map(from_geo_polygon).collect(),
    ))
}

/// 布尔运算在退化输入上可能 panic，这里转换为可恢复的错误。
pub(crate) fn guarded<T>(operation: impl FnOnce() -> T) -> Result<T, ClipError> {
    panic::catch_unwind(AssertUnwindSafe(operation)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ClipError::Failed(message)
    })
}

pub(crate) fn to_geo_line(path: &LinePath) -> LineString<f64> {
    LineString::new(
        path.points()
            .iter()
            .map(|point| Coord {
                x: point.x(),
                y: point.y(),
            })
            .collect(),
    )
}

pub(crate) fn to_geo_polygon(polygon: &PolygonShape) -> Polygon<f64> {
    Polygon::new(
        to_geo_line(&polygon.exterior),
        polygon.interiors.iter().map(to_geo_line).collect(),
    )
}

fn from_geo_line(line: &LineString<f64>) -> Option<LinePath> {
    if line.0.len() < 2 {
        return None;
    }
    Some(LinePath::new(
        line.0
            .iter()
            .map(|coord| Point2::new(coord.x, coord.y))
            .collect(),
    ))
}

fn from_geo_polygon(polygon: &Polygon<f64>) -> Option<PolygonShape> {
    let exterior = from_geo_line(polygon.exterior())?;
    if exterior.signed_area().abs() <= LENGTH_EPSILON {
        return None;
    }
    Some(PolygonShape::new(
        exterior,
        polygon
            .interiors()
            .iter()
            .filter_map(from_geo_line)
            .collect(),
    ))
}
