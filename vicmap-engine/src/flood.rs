//! 洪水线整合：数据缺失或读取失败都不会中断出图。

use std::collections::HashMap;

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Contains, Coord, Line};
use tracing::{debug, info, warn};
use vicmap_config::FloodRender;
use vicmap_core::crs::{CrsDefinition, reproject_shape};
use vicmap_core::geometry::{LENGTH_EPSILON, LinePath, Point2, PolygonShape, Shape};
use vicmap_core::source::{FloodFeature, FloodlineProvider};

use crate::aoi::AreaOfInterest;
use crate::clip::{ClipFn, clip_to_area, to_geo_line};
use crate::merge::{NodeKey, node_key};

#[derive(Debug, Clone, PartialEq)]
pub enum FloodStatus {
    /// 请求未指定县，未查询洪水线。
    Skipped,
    /// 该县没有洪水线数据。
    Absent,
    Unavailable { error: String },
    Included { features: usize },
}

#[derive(Debug, Clone)]
pub struct FloodIntegration {
    pub features: Vec<FloodFeature>,
    pub status: FloodStatus,
    /// 投影失败、修复后为空或位于范围外而被丢弃的要素数。
    pub dropped: usize,
    pub clip_fallbacks: usize,
}

impl FloodIntegration {
    fn without_data(status: FloodStatus) -> Self {
        Self {
            features: Vec::new(),
            status,
            dropped: 0,
            clip_fallbacks: 0,
        }
    }
}

pub struct FloodlineIntegrator<'a> {
    working_crs: &'a CrsDefinition,
    render: FloodRender,
    clip: ClipFn,
}

impl<'a> FloodlineIntegrator<'a> {
    pub fn new(working_crs: &'a CrsDefinition, render: FloodRender) -> Self {
        Self {
            working_crs,
            render,
            clip: clip_to_area,
        }
    }

    pub fn with_clipper(mut self, clip: ClipFn) -> Self {
        self.clip = clip;
        self
    }

    pub fn integrate<P>(
        &self,
        provider: &P,
        county: Option<&str>,
        aoi: &AreaOfInterest,
    ) -> FloodIntegration
    where
        P: FloodlineProvider + ?Sized,
    {
        let Some(county) = county else {
            debug!("未指定县，跳过洪水线");
            return FloodIntegration::without_data(FloodStatus::Skipped);
        };
        let collection = match provider.query(county) {
            Ok(Some(collection)) => collection,
            Ok(None) => {
                warn!(county, "该县没有洪水线数据，洪水图层将为空");
                return FloodIntegration::without_data(FloodStatus::Absent);
            }
            Err(err) => {
                warn!(county, error = %err, "洪水线读取失败，洪水图层将为空");
                return FloodIntegration::without_data(FloodStatus::Unavailable {
                    error: err.to_string(),
                });
            }
        };

        let mut features = Vec::new();
        let mut dropped = 0usize;
        let mut clip_fallbacks = 0usize;
        for feature in &collection.features {
            let zone = feature.zone.as_deref().unwrap_or("-");
            let projected =
                match reproject_shape(&feature.geometry, &collection.crs, self.working_crs) {
                    Ok(shape) => shape,
                    Err(err) => {
                        warn!(zone, error = %err, "洪水线要素无法投影，已丢弃");
                        dropped += 1;
                        continue;
                    }
                };
            let repaired = match self.render {
                FloodRender::Boundary => repair_boundary(&projected),
                FloodRender::Outline => repair(&projected),
            };
            let Some(rendered) = repaired else {
                warn!(zone, kind = projected.kind(), "洪水线要素修复后为空，已丢弃");
                dropped += 1;
                continue;
            };
            let geometry = match (self.clip)(&rendered, aoi.polygon()) {
                Ok(Some(shape)) => shape,
                Ok(None) => {
                    debug!(zone, "洪水线要素位于范围外");
                    dropped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(zone, error = %err, "洪水线裁剪失败，保留未裁剪几何");
                    clip_fallbacks += 1;
                    rendered
                }
            };
            features.push(FloodFeature {
                geometry,
                zone: feature.zone.clone(),
            });
        }

        info!(
            county,
            total = collection.features.len(),
            kept = features.len(),
            dropped,
            "洪水线整合完成"
        );
        FloodIntegration {
            status: FloodStatus::Included {
                features: features.len(),
            },
            features,
            dropped,
            clip_fallbacks,
        }
    }
}

/// 结构性修复：去除非有限点与连续重复点，补齐闭合环，在自相交处把环拆成
/// 简单环，丢弃退化的环与线。外环统一为逆时针、内环为顺时针。
pub fn repair(shape: &Shape) -> Option<Shape> {
    match shape {
        Shape::Line(line) => repair_line(line).map(Shape::Line),
        Shape::MultiLine(lines) => Shape::from_lines(lines.iter().filter_map(repair_line).collect()),
        Shape::Polygon(polygon) => Shape::from_polygons(repair_polygon(polygon)),
        Shape::MultiPolygon(polygons) => {
            Shape::from_polygons(polygons.iter().flat_map(repair_polygon).collect())
        }
    }
}

/// 边界渲染的修复：各环补齐闭合后按折线保留，只要求长度非零。
pub fn repair_boundary(shape: &Shape) -> Option<Shape> {
    match shape {
        Shape::Line(_) | Shape::MultiLine(_) => repair(shape),
        Shape::Polygon(_) | Shape::MultiPolygon(_) => Shape::from_lines(
            shape
                .paths()
                .into_iter()
                .map(|ring| LinePath::new(closed_points(ring)))
                .filter(|ring| !ring.is_degenerate())
                .collect(),
        ),
    }
}

fn cleaned_points(path: &LinePath) -> Vec<Point2> {
    let mut points: Vec<Point2> = Vec::with_capacity(path.len());
    for point in path.points().iter().copied().filter(|point| point.is_finite()) {
        if points
            .last()
            .is_some_and(|last| last.distance(point) <= LENGTH_EPSILON)
        {
            continue;
        }
        points.push(point);
    }
    points
}

fn closed_points(ring: &LinePath) -> Vec<Point2> {
    let mut points = cleaned_points(ring);
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
        if first.distance(last) > LENGTH_EPSILON {
            points.push(first);
        }
    }
    points
}

fn repair_line(line: &LinePath) -> Option<LinePath> {
    let repaired = LinePath::new(cleaned_points(line));
    if repaired.is_degenerate() {
        None
    } else {
        Some(repaired)
    }
}

fn oriented(ring: LinePath, counter_clockwise: bool) -> Option<LinePath> {
    if ring.len() < 4 {
        return None;
    }
    let area = ring.signed_area();
    if area.abs() <= LENGTH_EPSILON {
        return None;
    }
    if (area > 0.0) == counter_clockwise {
        Some(ring)
    } else {
        Some(ring.reversed())
    }
}

fn simple_rings(ring: &LinePath, counter_clockwise: bool) -> Vec<LinePath> {
    let points = closed_points(ring);
    if points.len() < 4 {
        return Vec::new();
    }
    split_at_crossings(&points)
        .into_iter()
        .filter_map(|ring| oriented(ring, counter_clockwise))
        .collect()
}

fn repair_polygon(polygon: &PolygonShape) -> Vec<PolygonShape> {
    let mut pieces: Vec<PolygonShape> = simple_rings(&polygon.exterior, true)
        .into_iter()
        .map(|shell| PolygonShape::new(shell, Vec::new()))
        .collect();
    if pieces.len() > 1 {
        debug!(parts = pieces.len(), "自相交外环已拆分");
    }
    let single = pieces.len() == 1;
    for hole in polygon.interiors.iter().flat_map(|ring| simple_rings(ring, false)) {
        let Some(first) = hole.start() else {
            continue;
        };
        if let Some(piece) = pieces
            .iter_mut()
            .find(|piece| single || shell_contains(&piece.exterior, first))
        {
            piece.interiors.push(hole);
        }
    }
    pieces
}

fn shell_contains(shell: &LinePath, point: Point2) -> bool {
    geo::Polygon::new(to_geo_line(shell), Vec::new()).contains(&geo::Point::new(point.x(), point.y()))
}

/// 把闭合点列在自相交处拆成若干闭合的简单环。交点先插入所在线段，
/// 再沿环行走，每回到一个已访问的结点就截下一个环。
fn split_at_crossings(points: &[Point2]) -> Vec<LinePath> {
    let segments = points.len() - 1;
    let mut cuts: Vec<Vec<Point2>> = vec![Vec::new(); segments];
    for i in 0..segments {
        let first = segment(points, i);
        for j in (i + 2)..segments {
            if i == 0 && j == segments - 1 {
                continue;
            }
            let second = segment(points, j);
            if let Some(LineIntersection::SinglePoint { intersection, .. }) =
                line_intersection(first, second)
            {
                let crossing = Point2::new(intersection.x, intersection.y);
                for index in [i, j] {
                    if is_interior(points, index, crossing) {
                        cuts[index].push(crossing);
                    }
                }
            }
        }
    }

    let mut walk = Vec::with_capacity(points.len());
    for (index, extra) in cuts.iter_mut().enumerate() {
        let start = points[index];
        walk.push(start);
        extra.sort_by(|a, b| start.distance(*a).total_cmp(&start.distance(*b)));
        extra.dedup_by_key(|point| node_key(*point));
        walk.extend(extra.iter().copied());
    }

    let mut rings = Vec::new();
    let mut stack: Vec<Point2> = Vec::with_capacity(walk.len());
    let mut visited: HashMap<NodeKey, usize> = HashMap::new();
    for point in walk {
        let key = node_key(point);
        match visited.get(&key).copied() {
            Some(position) => {
                let node = stack[position];
                let mut ring = vec![node];
                for removed in stack.drain(position + 1..) {
                    visited.remove(&node_key(removed));
                    ring.push(removed);
                }
                ring.push(node);
                rings.push(LinePath::new(ring));
            }
            None => {
                visited.insert(key, stack.len());
                stack.push(point);
            }
        }
    }
    if let Some(first) = stack.first().copied() {
        stack.push(first);
        rings.push(LinePath::new(stack));
    }
    rings
}

fn segment(points: &[Point2], index: usize) -> Line<f64> {
    let coord = |point: Point2| Coord {
        x: point.x(),
        y: point.y(),
    };
    Line::new(coord(points[index]), coord(points[index + 1]))
}

fn is_interior(points: &[Point2], index: usize, point: Point2) -> bool {
    let key = node_key(point);
    key != node_key(points[index]) && key != node_key(points[index + 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicmap_core::source::{FloodCollection, NoFloodlines, ProviderError};

    struct StaticFloodlines(Option<FloodCollection>);

    impl FloodlineProvider for StaticFloodlines {
        fn query(&self, _county: &str) -> Result<Option<FloodCollection>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenFloodlines;

    impl FloodlineProvider for BrokenFloodlines {
        fn query(&self, county: &str) -> Result<Option<FloodCollection>, ProviderError> {
            Err(ProviderError::Unavailable(format!("{county} archive corrupt")))
        }
    }

    fn ring(points: &[(f64, f64)]) -> LinePath {
        LinePath::new(points.iter().map(|(x, y)| Point2::new(*x, *y)).collect())
    }

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::build(Point2::new(-96.88, 32.76), 1.0, &CrsDefinition::Geographic, 64)
            .expect("aoi")
    }

    fn collection() -> FloodCollection {
        FloodCollection {
            crs: CrsDefinition::Geographic,
            features: vec![
                FloodFeature {
                    // 顺时针且未闭合，跨出缓冲圆
                    geometry: Shape::Polygon(PolygonShape::new(
                        ring(&[(-96.9, 32.75), (-96.9, 32.77), (-96.88, 32.77), (-96.88, 32.75)]),
                        Vec::new(),
                    )),
                    zone: Some("AE".to_string()),
                },
                FloodFeature {
                    geometry: Shape::Polygon(PolygonShape::new(
                        ring(&[(-96.87, 32.76), (-96.87, 32.76), (-96.87, 32.76)]),
                        Vec::new(),
                    )),
                    zone: None,
                },
                FloodFeature {
                    geometry: Shape::Line(ring(&[(-90.0, 30.0), (-90.1, 30.1)])),
                    zone: Some("X".to_string()),
                },
            ],
        }
    }

    #[test]
    fn repair_closes_and_orients_rings() {
        let shape = Shape::Polygon(PolygonShape::new(
            ring(&[(0.0, 0.0), (0.0, 10.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]),
            vec![ring(&[(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0), (2.0, 2.0)])],
        ));
        match repair(&shape).expect("repairable") {
            Shape::Polygon(polygon) => {
                assert!(polygon.exterior.is_closed());
                assert_eq!(polygon.exterior.len(), 5);
                assert!(polygon.exterior.signed_area() > 0.0);
                assert!(polygon.interiors[0].signed_area() < 0.0);
                assert!((polygon.area() - 96.0).abs() < 1e-9);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn repair_drops_empty_shells() {
        let collapsed = Shape::Polygon(PolygonShape::new(
            ring(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (0.0, 0.0)]),
            Vec::new(),
        ));
        assert!(repair(&collapsed).is_none());
        let nan_line = Shape::Line(ring(&[(f64::NAN, 0.0), (1.0, 1.0)]));
        assert!(repair(&nan_line).is_none());
    }

    #[test]
    fn boundary_render_clips_outline_to_area() {
        let integrator = FloodlineIntegrator::new(&CrsDefinition::Geographic, FloodRender::Boundary);
        let result = integrator.integrate(&StaticFloodlines(Some(collection())), Some("Dallas"), &aoi());

        assert_eq!(result.status, FloodStatus::Included { features: 1 });
        assert_eq!(result.dropped, 2);
        let feature = &result.features[0];
        assert_eq!(feature.zone.as_deref(), Some("AE"));
        assert!(!feature.geometry.is_areal());
        let bounds = feature.geometry.bounds().expect("bounds");
        assert!(bounds.min().x() > -96.8975);
    }

    #[test]
    fn outline_render_keeps_polygons() {
        let integrator = FloodlineIntegrator::new(&CrsDefinition::Geographic, FloodRender::Outline);
        let result = integrator.integrate(&StaticFloodlines(Some(collection())), Some("Dallas"), &aoi());
        assert_eq!(result.features.len(), 1);
        assert!(result.features[0].geometry.is_areal());
    }

    /// 以 (cx, cy) 为交点的 8 字形环，两瓣各为一个三角形。
    fn bowtie(cx: f64, cy: f64, half: f64) -> Shape {
        Shape::Polygon(PolygonShape::new(
            ring(&[
                (cx - half, cy - half),
                (cx + half, cy + half),
                (cx + half, cy - half),
                (cx - half, cy + half),
                (cx - half, cy - half),
            ]),
            Vec::new(),
        ))
    }

    fn bowtie_collection() -> FloodCollection {
        FloodCollection {
            crs: CrsDefinition::Geographic,
            features: vec![FloodFeature {
                geometry: bowtie(-96.88, 32.76, 0.004),
                zone: Some("AE".to_string()),
            }],
        }
    }

    #[test]
    fn self_intersecting_ring_splits_into_lobes() {
        match repair(&bowtie(0.0, 0.0, 1000.0)).expect("bowtie is repairable") {
            Shape::MultiPolygon(lobes) => {
                assert_eq!(lobes.len(), 2);
                for lobe in &lobes {
                    assert!(lobe.exterior.is_closed());
                    assert_eq!(lobe.exterior.len(), 4);
                    assert!(lobe.exterior.signed_area() > 0.0);
                    assert!((lobe.area() - 1.0e6).abs() < 1e-3);
                }
            }
            other => panic!("expected two lobes, got {}", other.kind()),
        }
    }

    #[test]
    fn boundary_repair_keeps_self_intersecting_ring() {
        match repair_boundary(&bowtie(0.0, 0.0, 1000.0)).expect("boundary kept") {
            Shape::Line(line) => {
                assert!(line.is_closed());
                assert_eq!(line.len(), 5);
            }
            other => panic!("expected one boundary line, got {}", other.kind()),
        }
    }

    #[test]
    fn bowtie_zone_is_drawn_under_both_renders() {
        for render in [FloodRender::Boundary, FloodRender::Outline] {
            let integrator = FloodlineIntegrator::new(&CrsDefinition::Geographic, render);
            let result =
                integrator.integrate(&StaticFloodlines(Some(bowtie_collection())), Some("Dallas"), &aoi());
            assert_eq!(result.status, FloodStatus::Included { features: 1 }, "{render:?}");
            assert_eq!(result.dropped, 0, "{render:?}");
            assert_eq!(
                result.features[0].geometry.is_areal(),
                render == FloodRender::Outline
            );
        }
    }

    fn failing_clip(
        _shape: &Shape,
        _area: &PolygonShape,
    ) -> Result<Option<Shape>, crate::clip::ClipError> {
        crate::clip::guarded(|| panic!("overlay sweep panicked"))
    }

    #[test]
    fn failed_clip_keeps_unclipped_feature() {
        let integrator = FloodlineIntegrator::new(&CrsDefinition::Geographic, FloodRender::Boundary)
            .with_clipper(failing_clip);
        let result = integrator.integrate(&StaticFloodlines(Some(collection())), Some("Dallas"), &aoi());

        assert_eq!(result.clip_fallbacks, 2);
        assert_eq!(result.dropped, 1);
        let bounds = result.features[0].geometry.bounds().expect("bounds");
        assert!((bounds.min().x() - -96.9).abs() < 1e-12);
    }

    #[test]
    fn missing_or_failing_data_is_not_fatal() {
        let integrator = FloodlineIntegrator::new(&CrsDefinition::Geographic, FloodRender::Boundary);
        let absent = integrator.integrate(&NoFloodlines, Some("Collin"), &aoi());
        assert_eq!(absent.status, FloodStatus::Absent);
        assert!(absent.features.is_empty());

        let broken = integrator.integrate(&BrokenFloodlines, Some("Ellis"), &aoi());
        assert!(matches!(broken.status, FloodStatus::Unavailable { .. }));

        let skipped = integrator.integrate(&NoFloodlines, None, &aoi());
        assert_eq!(skipped.status, FloodStatus::Skipped);
    }
}
