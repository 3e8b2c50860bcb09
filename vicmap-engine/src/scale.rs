//! 网格坐标与地面坐标之间的均匀缩放。

use std::fmt;
use std::str::FromStr;

use vicmap_core::geometry::{Point2, Shape};

use crate::request::RequestError;

/// 系数与 1 的差小于该值时视为恒等变换。
pub const IDENTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoordinateBasis {
    #[default]
    Grid,
    Surface,
}

impl CoordinateBasis {
    /// 文件名中使用的坐标基准后缀。
    pub fn suffix(self) -> &'static str {
        match self {
            CoordinateBasis::Grid => "N83G",
            CoordinateBasis::Surface => "N83S",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoordinateBasis::Grid => "grid",
            CoordinateBasis::Surface => "surface",
        }
    }
}

impl fmt::Display for CoordinateBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoordinateBasis {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(CoordinateBasis::Grid),
            "surface" => Ok(CoordinateBasis::Surface),
            other => Err(format!("未知坐标基准 {other}，可选 grid 或 surface")),
        }
    }
}

/// 每次出图固定的一次缩放：`p' = origin + (p - origin) × factor`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTransform {
    basis: CoordinateBasis,
    factor: f64,
    origin: Point2,
}

impl ScaleTransform {
    pub fn grid() -> Self {
        Self {
            basis: CoordinateBasis::Grid,
            factor: 1.0,
            origin: Point2::new(0.0, 0.0),
        }
    }

    pub fn surface(factor: f64, origin: Point2) -> Result<Self, RequestError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(RequestError::InvalidScaleFactor(factor));
        }
        Ok(Self {
            basis: CoordinateBasis::Surface,
            factor,
            origin,
        })
    }

    #[inline]
    pub fn basis(&self) -> CoordinateBasis {
        self.basis
    }

    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    #[inline]
    pub fn origin(&self) -> Point2 {
        self.origin
    }

    pub fn is_identity(&self) -> bool {
        self.basis == CoordinateBasis::Grid || (self.factor - 1.0).abs() <= IDENTITY_EPSILON
    }

    pub fn apply_point(&self, point: Point2) -> Point2 {
        if self.is_identity() {
            return point;
        }
        point.scale_about(self.origin, self.factor)
    }

    /// 就地缩放，部分数量、点数与点序保持不变。
    pub fn apply(&self, shape: &mut Shape) {
        if self.is_identity() {
            return;
        }
        shape.map_points(|point| point.scale_about(self.origin, self.factor));
    }

    /// 逆变换，用于把地面坐标换回网格坐标。
    pub fn inverse(&self) -> Self {
        match self.basis {
            CoordinateBasis::Grid => *self,
            CoordinateBasis::Surface => Self {
                basis: self.basis,
                factor: 1.0 / self.factor,
                origin: self.origin,
            },
        }
    }
}

impl Default for ScaleTransform {
    fn default() -> Self {
        Self::grid()
    }
}
