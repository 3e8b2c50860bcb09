//! 外部数据源的接口约定：道路网络与洪水线。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crs::CrsDefinition;
use crate::geometry::{LonLat, Shape};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read data file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse data file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("unsupported query: {0}")]
    Unsupported(String),
}

/// 道路网络类型，决定查询时保留哪些道路等级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    All,
    AllPrivate,
    Drive,
    DriveService,
    Walk,
    Bike,
}

const NEVER_ROUTABLE: &[&str] = &[
    "abandoned",
    "construction",
    "no",
    "planned",
    "platform",
    "proposed",
    "raceway",
    "razed",
];

const DRIVABLE: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "residential",
    "living_street",
    "road",
];

const MOTOR_ONLY: &[&str] = &["motorway", "motorway_link", "trunk", "trunk_link"];

impl NetworkType {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkType::All => "all",
            NetworkType::AllPrivate => "all_private",
            NetworkType::Drive => "drive",
            NetworkType::DriveService => "drive_service",
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
        }
    }

    /// 判断 OSM `highway` 取值是否属于该网络类型；缺少等级信息时仅 `all` 类保留。
    pub fn admits(self, highway: Option<&str>) -> bool {
        let Some(highway) = highway else {
            return matches!(self, NetworkType::All | NetworkType::AllPrivate);
        };
        if NEVER_ROUTABLE.contains(&highway) {
            return false;
        }
        match self {
            NetworkType::All | NetworkType::AllPrivate => true,
            NetworkType::Drive => DRIVABLE.contains(&highway),
            NetworkType::DriveService => DRIVABLE.contains(&highway) || highway == "service",
            NetworkType::Walk => !MOTOR_ONLY.contains(&highway) && highway != "cycleway",
            NetworkType::Bike => !MOTOR_ONLY.contains(&highway) && !matches!(highway, "footway" | "steps"),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(NetworkType::All),
            "all_private" => Ok(NetworkType::AllPrivate),
            "drive" => Ok(NetworkType::Drive),
            "drive_service" => Ok(NetworkType::DriveService),
            "walk" => Ok(NetworkType::Walk),
            "bike" => Ok(NetworkType::Bike),
            other => Err(ProviderError::Unsupported(format!("未知网络类型 {other}"))),
        }
    }
}

/// 原始道路名称的三种形态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoadName {
    Missing,
    Single(String),
    Aliases(Vec<String>),
}

/// 道路图中的一条边。
#[derive(Debug, Clone)]
pub struct RoadEdge {
    pub geometry: Shape,
    pub name: RoadName,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadQuery {
    pub center: LonLat,
    pub distance_m: f64,
    pub network_type: NetworkType,
}

pub trait RoadNetworkProvider {
    /// 返回边几何所在的坐标系，默认为经纬度。
    fn source_crs(&self) -> CrsDefinition {
        CrsDefinition::Geographic
    }

    fn query(&self, query: &RoadQuery) -> Result<Vec<RoadEdge>, ProviderError>;
}

/// 一条监管洪水线要素，`zone` 为洪水区划属性（若有）。
#[derive(Debug, Clone)]
pub struct FloodFeature {
    pub geometry: Shape,
    pub zone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FloodCollection {
    pub crs: CrsDefinition,
    pub features: Vec<FloodFeature>,
}

pub trait FloodlineProvider {
    /// `Ok(None)` 表示该县没有洪水线数据，属于正常结果。
    fn query(&self, county: &str) -> Result<Option<FloodCollection>, ProviderError>;
}

/// 未配置道路数据源时使用，每次查询都报告不可用。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoadNetwork;

impl RoadNetworkProvider for NoRoadNetwork {
    fn query(&self, query: &RoadQuery) -> Result<Vec<RoadEdge>, ProviderError> {
        Err(ProviderError::Unavailable(format!(
            "未配置道路数据源（network_type={}）",
            query.network_type
        )))
    }
}

/// 未配置洪水线数据源时使用。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFloodlines;

impl FloodlineProvider for NoFloodlines {
    fn query(&self, _county: &str) -> Result<Option<FloodCollection>, ProviderError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_network_excludes_paths_and_service_roads() {
        assert!(NetworkType::Drive.admits(Some("residential")));
        assert!(!NetworkType::Drive.admits(Some("footway")));
        assert!(!NetworkType::Drive.admits(Some("service")));
        assert!(NetworkType::DriveService.admits(Some("service")));
        assert!(!NetworkType::Drive.admits(None));
        assert!(NetworkType::All.admits(None));
        assert!(!NetworkType::All.admits(Some("proposed")));
        assert!(!NetworkType::Walk.admits(Some("motorway")));
    }

    #[test]
    fn network_type_parses_from_text() {
        assert_eq!("Drive".parse::<NetworkType>().ok(), Some(NetworkType::Drive));
        assert_eq!(
            " all_private ".parse::<NetworkType>().ok(),
            Some(NetworkType::AllPrivate)
        );
        assert!("boat".parse::<NetworkType>().is_err());
        assert_eq!(NetworkType::DriveService.to_string(), "drive_service");
    }

    #[test]
    fn placeholder_providers_report_absence() {
        let query = RoadQuery {
            center: LonLat::new(-96.8, 32.8),
            distance_m: 100.0,
            network_type: NetworkType::All,
        };
        assert!(matches!(
            NoRoadNetwork.query(&query),
            Err(ProviderError::Unavailable(_))
        ));
        assert!(matches!(NoFloodlines.query("Dallas"), Ok(None)));
    }
}
