use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{LonLat, Point2, Shape};

const INVERSE_LATITUDE_TOLERANCE: f64 = 1e-12;
const INVERSE_MAX_ITERATIONS: usize = 16;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrsError {
    #[error("coordinate is not finite: ({x}, {y})")]
    NonFinite { x: f64, y: f64 },
    #[error("coordinate outside projection domain: ({x}, {y})")]
    OutOfDomain { x: f64, y: f64 },
    #[error("invalid projection parameters: {0}")]
    InvalidParameters(String),
}

/// 投影坐标的长度单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearUnit {
    Metre,
    UsSurveyFoot,
    InternationalFoot,
}

impl LinearUnit {
    #[inline]
    pub fn metres_per_unit(self) -> f64 {
        match self {
            LinearUnit::Metre => 1.0,
            LinearUnit::UsSurveyFoot => 1200.0 / 3937.0,
            LinearUnit::InternationalFoot => 0.3048,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub semi_major_axis: f64,
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub const GRS80: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        inverse_flattening: 298.257_222_101,
    };

    fn grs80() -> Self {
        Self::GRS80
    }

    #[inline]
    pub fn eccentricity(&self) -> f64 {
        let f = 1.0 / self.inverse_flattening;
        (2.0 * f - f * f).sqrt()
    }
}

/// 双标准纬线兰伯特等角圆锥投影（EPSG 方法 9802）。角度参数以度表示，
/// 假东/假北以 `unit` 为单位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambertConformalConic {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub epsg: Option<u32>,
    #[serde(default = "Ellipsoid::grs80")]
    pub ellipsoid: Ellipsoid,
    pub standard_parallel_1: f64,
    pub standard_parallel_2: f64,
    pub latitude_of_origin: f64,
    pub central_meridian: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    pub unit: LinearUnit,
}

/// 坐标参考系定义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrsDefinition {
    /// 经纬度（度），x 为经度、y 为纬度。
    Geographic,
    LambertConformalConic(LambertConformalConic),
}

impl Default for CrsDefinition {
    fn default() -> Self {
        Self::texas_north_central_ftus()
    }
}

impl CrsDefinition {
    /// NAD83(2011) / Texas North Central (ftUS)，EPSG:6584。
    pub fn texas_north_central_ftus() -> Self {
        CrsDefinition::LambertConformalConic(LambertConformalConic {
            name: Some("NAD83(2011) / Texas North Central (ftUS)".to_string()),
            epsg: Some(6584),
            ellipsoid: Ellipsoid::GRS80,
            standard_parallel_1: 33.0 + 58.0 / 60.0,
            standard_parallel_2: 32.0 + 8.0 / 60.0,
            latitude_of_origin: 31.0 + 40.0 / 60.0,
            central_meridian: -98.5,
            false_easting: 1_968_500.0,
            false_northing: 6_561_666.667,
            unit: LinearUnit::UsSurveyFoot,
        })
    }

    #[inline]
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsDefinition::Geographic)
    }

    /// 便于日志输出的简短标识。
    pub fn label(&self) -> String {
        match self {
            CrsDefinition::Geographic => "geographic".to_string(),
            CrsDefinition::LambertConformalConic(lcc) => match (&lcc.epsg, &lcc.name) {
                (Some(code), _) => format!("EPSG:{code}"),
                (None, Some(name)) => name.clone(),
                (None, None) => "lambert_conformal_conic".to_string(),
            },
        }
    }

    /// 每个坐标单位对应的米数；经纬度坐标系返回 `None`。
    pub fn metres_per_unit(&self) -> Option<f64> {
        match self {
            CrsDefinition::Geographic => None,
            CrsDefinition::LambertConformalConic(lcc) => Some(lcc.unit.metres_per_unit()),
        }
    }

    pub fn to_geographic(&self, point: Point2) -> Result<LonLat, CrsError> {
        ensure_finite(point)?;
        match self {
            CrsDefinition::Geographic => {
                let lonlat = LonLat::from_point(point);
                check_lonlat(lonlat)?;
                Ok(lonlat)
            }
            CrsDefinition::LambertConformalConic(lcc) => lcc.constants()?.inverse(point),
        }
    }

    pub fn from_geographic(&self, lonlat: LonLat) -> Result<Point2, CrsError> {
        ensure_finite(lonlat.as_point())?;
        check_lonlat(lonlat)?;
        match self {
            CrsDefinition::Geographic => Ok(lonlat.as_point()),
            CrsDefinition::LambertConformalConic(lcc) => lcc.constants()?.forward(lonlat),
        }
    }
}

/// 在两个坐标系之间转换单点，坐标系相同时原样返回。
pub fn reproject_point(
    point: Point2,
    from: &CrsDefinition,
    to: &CrsDefinition,
) -> Result<Point2, CrsError> {
    if from == to {
        return Ok(point);
    }
    to.from_geographic(from.to_geographic(point)?)
}

/// 转换整个几何体；任一点失败则整体失败。
pub fn reproject_shape(
    shape: &Shape,
    from: &CrsDefinition,
    to: &CrsDefinition,
) -> Result<Shape, CrsError> {
    if from == to {
        return Ok(shape.clone());
    }
    let mut projected = shape.clone();
    let mut failure = None;
    projected.map_points(|point| match reproject_point(point, from, to) {
        Ok(converted) => converted,
        Err(err) => {
            failure.get_or_insert(err);
            point
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(projected),
    }
}

fn ensure_finite(point: Point2) -> Result<(), CrsError> {
    if point.is_finite() {
        Ok(())
    } else {
        Err(CrsError::NonFinite {
            x: point.x(),
            y: point.y(),
        })
    }
}

fn check_lonlat(lonlat: LonLat) -> Result<(), CrsError> {
    if lonlat.lat.abs() > 90.0 || lonlat.lon.abs() > 540.0 {
        return Err(CrsError::OutOfDomain {
            x: lonlat.lon,
            y: lonlat.lat,
        });
    }
    Ok(())
}

struct LccConstants {
    a: f64,
    e: f64,
    n: f64,
    f: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
    metres_per_unit: f64,
}

impl LambertConformalConic {
    fn constants(&self) -> Result<LccConstants, CrsError> {
        let a = self.ellipsoid.semi_major_axis;
        if !(a.is_finite() && a > 0.0 && self.ellipsoid.inverse_flattening > 1.0) {
            return Err(CrsError::InvalidParameters(format!(
                "椭球参数无效: a={a}, 1/f={}",
                self.ellipsoid.inverse_flattening
            )));
        }
        let e = self.ellipsoid.eccentricity();
        let phi1 = self.standard_parallel_1.to_radians();
        let phi2 = self.standard_parallel_2.to_radians();
        let phi0 = self.latitude_of_origin.to_radians();
        if phi1.abs() >= FRAC_PI_2 || phi2.abs() >= FRAC_PI_2 || (phi1 + phi2).abs() < 1e-12 {
            return Err(CrsError::InvalidParameters(format!(
                "标准纬线无效: {} / {}",
                self.standard_parallel_1, self.standard_parallel_2
            )));
        }

        let m1 = conformal_m(phi1, e);
        let m2 = conformal_m(phi2, e);
        let t1 = conformal_t(phi1, e);
        let t2 = conformal_t(phi2, e);
        let t0 = conformal_t(phi0, e);
        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        let f = m1 / (n * t1.powf(n));
        let rho0 = a * f * t0.powf(n);

        Ok(LccConstants {
            a,
            e,
            n,
            f,
            rho0,
            lon0: self.central_meridian.to_radians(),
            false_easting: self.false_easting,
            false_northing: self.false_northing,
            metres_per_unit: self.unit.metres_per_unit(),
        })
    }
}

impl LccConstants {
    fn forward(&self, lonlat: LonLat) -> Result<Point2, CrsError> {
        let phi = lonlat.lat.to_radians();
        if (phi.abs() - FRAC_PI_2).abs() < 1e-12 && phi.signum() != self.n.signum() {
            return Err(CrsError::OutOfDomain {
                x: lonlat.lon,
                y: lonlat.lat,
            });
        }
        let t = conformal_t(phi, self.e);
        let rho = self.a * self.f * t.powf(self.n);
        let theta = self.n * wrap_pi(lonlat.lon.to_radians() - self.lon0);

        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();
        Ok(Point2::new(
            self.false_easting + x / self.metres_per_unit,
            self.false_northing + y / self.metres_per_unit,
        ))
    }

    fn inverse(&self, point: Point2) -> Result<LonLat, CrsError> {
        let x = (point.x() - self.false_easting) * self.metres_per_unit;
        let y = self.rho0 - (point.y() - self.false_northing) * self.metres_per_unit;
        let rho = self.n.signum() * (x * x + y * y).sqrt();
        let theta = if self.n > 0.0 {
            x.atan2(y)
        } else {
            (-x).atan2(-y)
        };

        let t = (rho / (self.a * self.f)).powf(1.0 / self.n);
        if !t.is_finite() {
            return Err(CrsError::OutOfDomain {
                x: point.x(),
                y: point.y(),
            });
        }
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let es = self.e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < INVERSE_LATITUDE_TOLERANCE {
                break;
            }
        }
        let lambda = theta / self.n + self.lon0;
        let lonlat = LonLat::new(wrap_pi(lambda).to_degrees(), phi.to_degrees());
        if !lonlat.as_point().is_finite() {
            return Err(CrsError::OutOfDomain {
                x: point.x(),
                y: point.y(),
            });
        }
        Ok(lonlat)
    }
}

fn conformal_m(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / (1.0 - es * es).sqrt()
}

fn conformal_t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

fn wrap_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped < -PI { wrapped + TAU } else { wrapped }
}
