//! 分析范围：以锚点为圆心的测地缓冲圆。

use std::f64::consts::TAU;

use thiserror::Error;
use tracing::debug;
use vicmap_core::crs::{CrsDefinition, CrsError};
use vicmap_core::geometry::{Bounds2D, LinePath, LonLat, Point2, PolygonShape, Shape};

pub const METRES_PER_MILE: f64 = 1_609.344;
/// 平均地球半径（IUGG）。
const EARTH_RADIUS_M: f64 = 6_371_008.8;
const MIN_SEGMENTS: usize = 8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AoiError {
    #[error("buffer radius must be positive (got {0} miles)")]
    InvalidRadius(f64),
    #[error(transparent)]
    Projection(#[from] CrsError),
}

#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    anchor: Point2,
    centroid: LonLat,
    radius_m: f64,
    polygon: PolygonShape,
}

impl AreaOfInterest {
    /// 在经纬度上按球面正算求出圆周点再投影回工作坐标系，
    /// 工作坐标系单位不是米时也不会产生变形。
    pub fn build(
        anchor: Point2,
        radius_miles: f64,
        crs: &CrsDefinition,
        segments: usize,
    ) -> Result<Self, AoiError> {
        if !(radius_miles.is_finite() && radius_miles > 0.0) {
            return Err(AoiError::InvalidRadius(radius_miles));
        }
        let radius_m = radius_miles * METRES_PER_MILE;
        let centroid = crs.to_geographic(anchor)?;
        let segments = segments.max(MIN_SEGMENTS);

        let mut ring = Vec::with_capacity(segments + 1);
        for step in 0..segments {
            // 方位角递减，投影后得到逆时针的外环
            let bearing = -(step as f64) * TAU / segments as f64;
            ring.push(crs.from_geographic(destination(centroid, bearing, radius_m))?);
        }
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }

        debug!(
            crs = %crs.label(),
            lon = centroid.lon,
            lat = centroid.lat,
            radius_m,
            segments,
            "分析范围已生成"
        );
        Ok(Self {
            anchor,
            centroid,
            radius_m,
            polygon: PolygonShape::new(LinePath::new(ring), Vec::new()),
        })
    }

    #[inline]
    pub fn anchor(&self) -> Point2 {
        self.anchor
    }

    /// 锚点的经纬度，用于按地理位置检索的数据源。
    #[inline]
    pub fn centroid(&self) -> LonLat {
        self.centroid
    }

    #[inline]
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// 数据源检索距离（米），与缓冲半径一致。
    #[inline]
    pub fn search_distance_m(&self) -> f64 {
        self.radius_m
    }

    #[inline]
    pub fn polygon(&self) -> &PolygonShape {
        &self.polygon
    }

    pub fn bounds(&self) -> Bounds2D {
        self.polygon.exterior.bounds()
    }

    /// 缓冲圆外环，用作项目范围线。
    pub fn boundary_shape(&self) -> Shape {
        Shape::Line(self.polygon.exterior.clone())
    }
}

/// 球面正算：自 `origin` 沿方位角 `bearing`（弧度，北为 0、顺时针）前进 `distance_m`。
fn destination(origin: LonLat, bearing: f64, distance_m: f64) -> LonLat {
    let delta = distance_m / EARTH_RADIUS_M;
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lon.to_radians();
    let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * bearing.cos();
    let phi2 = sin_phi2.clamp(-1.0, 1.0).asin();
    let lambda2 = lambda1
        + (bearing.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * sin_phi2);
    LonLat::new(lambda2.to_degrees(), phi2.to_degrees())
}

/// 两个经纬度点间的球面距离（米）。
#[cfg(test)]
fn haversine_m(a: LonLat, b: LonLat) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = phi2 - phi1;
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
