//! 出图请求：由界面层收集、进入流程前统一校验的参数集合。

use std::fmt;

use thiserror::Error;
use vicmap_core::geometry::Point2;

use crate::naming::sanitize_project_name;
use crate::scale::CoordinateBasis;

/// 允许的出图比例（1 英寸对应的英尺数）。
pub const ALLOWED_SCALES: [u32; 12] = [1, 10, 20, 30, 40, 50, 60, 80, 100, 150, 200, 500];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("project name is empty after removing illegal characters")]
    EmptyProjectName,
    #[error("buffer radius must be positive (got {0} miles)")]
    InvalidRadius(f64),
    #[error("unsupported drawing scale 1\"={0}'")]
    UnsupportedScale(u32),
    #[error("text plot height must be positive (got {0})")]
    InvalidTextHeight(f64),
    #[error("anchor coordinates are not finite")]
    NonFiniteAnchor,
    #[error("surface basis needs a scale factor, none given in the request or config (county: {county:?})")]
    MissingScaleFactor { county: Option<String> },
    #[error("scale factor must be finite and positive (got {0})")]
    InvalidScaleFactor(f64),
    #[error("surface basis is not available on a geographic working CRS")]
    SurfaceOnGeographic,
}

/// 经过校验的出图比例。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawingScale(u32);

impl DrawingScale {
    pub fn new(feet_per_inch: u32) -> Result<Self, RequestError> {
        if ALLOWED_SCALES.contains(&feet_per_inch) {
            Ok(Self(feet_per_inch))
        } else {
            Err(RequestError::UnsupportedScale(feet_per_inch))
        }
    }

    #[inline]
    pub fn feet_per_inch(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn factor(self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for DrawingScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1\"={}'", self.0)
    }
}

/// 项目锚点，北坐标/东坐标使用工作坐标系单位。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPoint {
    pub northing: f64,
    pub easting: f64,
}

impl AnchorPoint {
    pub fn new(northing: f64, easting: f64) -> Self {
        Self { northing, easting }
    }

    /// x 为东坐标、y 为北坐标。
    #[inline]
    pub fn as_point(self) -> Point2 {
        Point2::new(self.easting, self.northing)
    }
}

#[derive(Debug, Clone)]
pub struct MapRequest {
    pub project_name: String,
    pub anchor: AnchorPoint,
    pub buffer_miles: f64,
    pub drawing_scale: DrawingScale,
    /// 打印出来的文字高度，模型空间高度 = 该值 × 比例。
    pub text_plot_height: f64,
    pub font: String,
    pub county: Option<String>,
    pub basis: CoordinateBasis,
    /// 显式给出的缩放系数；缺省时按县名查配置。
    pub scale_factor: Option<f64>,
}

impl MapRequest {
    /// 检查与外部配置无关的参数。
    pub fn validate(&self) -> Result<(), RequestError> {
        if sanitize_project_name(&self.project_name).is_none() {
            return Err(RequestError::EmptyProjectName);
        }
        if !self.anchor.as_point().is_finite() {
            return Err(RequestError::NonFiniteAnchor);
        }
        if !(self.buffer_miles.is_finite() && self.buffer_miles > 0.0) {
            return Err(RequestError::InvalidRadius(self.buffer_miles));
        }
        if !(self.text_plot_height.is_finite() && self.text_plot_height > 0.0) {
            return Err(RequestError::InvalidTextHeight(self.text_plot_height));
        }
        if let Some(factor) = self.scale_factor {
            check_scale_factor(factor)?;
        }
        Ok(())
    }

    /// 县名去掉首尾空白，空串视为未提供。
    pub fn county(&self) -> Option<&str> {
        self.county
            .as_deref()
            .map(str::trim)
            .filter(|county| !county.is_empty())
    }
}

pub(crate) fn check_scale_factor(factor: f64) -> Result<f64, RequestError> {
    if factor.is_finite() && factor > 0.0 {
        Ok(factor)
    } else {
        Err(RequestError::InvalidScaleFactor(factor))
    }
}
