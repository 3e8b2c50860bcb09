//! 基于 GeoJSON 文件的道路与洪水线数据源。

use std::fs;
use std::path::{Path, PathBuf};

use geojson::{Feature, GeoJson, JsonValue, Value};
use tracing::{debug, warn};
use vicmap_core::crs::CrsDefinition;
use vicmap_core::geometry::{Bounds2D, LinePath, Point2, PolygonShape, Shape};
use vicmap_core::source::{
    FloodCollection, FloodFeature, FloodlineProvider, ProviderError, RoadEdge, RoadName,
    RoadNetworkProvider, RoadQuery,
};

const METRES_PER_DEGREE: f64 = 111_320.0;

/// 从导出的 OSM 道路 GeoJSON（经纬度）中按查询范围筛选道路边。
#[derive(Debug, Clone)]
pub struct GeoJsonRoadProvider {
    path: PathBuf,
}

impl GeoJsonRoadProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RoadNetworkProvider for GeoJsonRoadProvider {
    fn query(&self, query: &RoadQuery) -> Result<Vec<RoadEdge>, ProviderError> {
        let features = read_features(&self.path).map_err(|err| match err {
            ProviderError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ProviderError::Unavailable(format!("道路数据文件 {:?} 不存在", self.path))
            }
            other => other,
        })?;
        let window = query_window(query);

        let mut edges = Vec::new();
        for feature in &features {
            let highway = feature.property("highway").and_then(JsonValue::as_str);
            if !query.network_type.admits(highway) {
                continue;
            }
            let Some(geometry) = feature_shape(feature) else {
                continue;
            };
            if geometry.is_areal() {
                continue;
            }
            match geometry.bounds() {
                Some(bounds) if bounds.intersects(&window) => {}
                _ => continue,
            }
            edges.push(RoadEdge {
                geometry,
                name: road_name(feature.property("name")),
            });
        }

        debug!(
            path = %self.path.display(),
            network_type = %query.network_type,
            total = features.len(),
            matched = edges.len(),
            "道路 GeoJSON 查询完成"
        );
        if edges.is_empty() {
            return Err(ProviderError::Unavailable(format!(
                "查询范围内没有 {} 类道路",
                query.network_type
            )));
        }
        Ok(edges)
    }
}

/// 按县名定位洪水线文件；文件缺失视为该县没有数据。
#[derive(Debug, Clone)]
pub struct GeoJsonFloodProvider {
    data_dir: PathBuf,
    file_pattern: String,
    source_crs: CrsDefinition,
    zone_field: String,
}

impl GeoJsonFloodProvider {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        file_pattern: impl Into<String>,
        source_crs: CrsDefinition,
        zone_field: impl Into<String>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_pattern: file_pattern.into(),
            source_crs,
            zone_field: zone_field.into(),
        }
    }

    pub fn path_for(&self, county: &str) -> PathBuf {
        self.data_dir
            .join(self.file_pattern.replace("{county}", county.trim()))
    }
}

impl FloodlineProvider for GeoJsonFloodProvider {
    fn query(&self, county: &str) -> Result<Option<FloodCollection>, ProviderError> {
        let path = self.path_for(county);
        if !path.is_file() {
            debug!(path = %path.display(), "未找到洪水线文件");
            return Ok(None);
        }

        let raw = read_features(&path)?;
        let mut features = Vec::with_capacity(raw.len());
        let mut skipped = 0usize;
        for feature in &raw {
            match feature_shape(feature) {
                Some(geometry) => features.push(FloodFeature {
                    geometry,
                    zone: feature
                        .property(&self.zone_field)
                        .and_then(JsonValue::as_str)
                        .map(|zone| zone.trim().to_string())
                        .filter(|zone| !zone.is_empty()),
                }),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "部分洪水线要素缺少可用几何，已跳过");
        }

        Ok(Some(FloodCollection {
            crs: self.source_crs.clone(),
            features,
        }))
    }
}

fn read_features(path: &Path) -> Result<Vec<Feature>, ProviderError> {
    let data = fs::read_to_string(path).map_err(|source| ProviderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = data
        .parse::<GeoJson>()
        .map_err(|err| ProviderError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    match parsed {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(feature) => Ok(vec![feature]),
        GeoJson::Geometry(_) => Err(ProviderError::Parse {
            path: path.to_path_buf(),
            message: "期望 Feature 或 FeatureCollection".to_string(),
        }),
    }
}

/// 查询圆的外接经纬度矩形。
fn query_window(query: &RoadQuery) -> Bounds2D {
    let center = query.center;
    let dlat = query.distance_m / METRES_PER_DEGREE;
    let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
    let dlon = query.distance_m / (METRES_PER_DEGREE * cos_lat);
    Bounds2D::new(
        Point2::new(center.lon - dlon, center.lat - dlat),
        Point2::new(center.lon + dlon, center.lat + dlat),
    )
}

fn road_name(value: Option<&JsonValue>) -> RoadName {
    match value {
        Some(JsonValue::String(name)) => RoadName::Single(name.clone()),
        Some(JsonValue::Array(items)) => RoadName::Aliases(
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => RoadName::Missing,
    }
}

fn feature_shape(feature: &Feature) -> Option<Shape> {
    let geometry = feature.geometry.as_ref()?;
    match &geometry.value {
        Value::LineString(points) => Shape::from_lines(vec![path(points)?]),
        Value::MultiLineString(lines) => {
            Shape::from_lines(lines.iter().filter_map(|line| path(line)).collect())
        }
        Value::Polygon(rings) => Shape::from_polygons(polygon(rings).into_iter().collect()),
        Value::MultiPolygon(polygons) => {
            Shape::from_polygons(polygons.iter().filter_map(|rings| polygon(rings)).collect())
        }
        _ => None,
    }
}

fn path(positions: &[Vec<f64>]) -> Option<LinePath> {
    let points = positions
        .iter()
        .filter(|position| position.len() >= 2)
        .map(|position| Point2::new(position[0], position[1]))
        .collect::<Vec<_>>();
    if points.len() < 2 {
        return None;
    }
    Some(LinePath::new(points))
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<PolygonShape> {
    let (exterior, interiors) = rings.split_first()?;
    Some(PolygonShape::new(
        path(exterior)?,
        interiors.iter().filter_map(|ring| path(ring)).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vicmap_core::geometry::LonLat;
    use vicmap_core::source::NetworkType;

    const ROADS: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"highway": "residential", "name": "Elm Street"},
         "geometry": {"type": "LineString", "coordinates": [[-96.880, 32.760], [-96.879, 32.761]]}},
        {"type": "Feature", "properties": {"highway": "footway", "name": ["Trail A", "Trail B"]},
         "geometry": {"type": "LineString", "coordinates": [[-96.880, 32.759], [-96.880, 32.758]]}},
        {"type": "Feature", "properties": {"highway": "primary"},
         "geometry": {"type": "LineString", "coordinates": [[-90.0, 30.0], [-90.1, 30.1]]}}
      ]
    }"#;

    fn write_temp(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).expect("create geojson");
        file.write_all(body.as_bytes()).expect("write geojson");
        path
    }

    fn query(network_type: NetworkType) -> RoadQuery {
        RoadQuery {
            center: LonLat::new(-96.8795, 32.76),
            distance_m: 1_000.0,
            network_type,
        }
    }

    #[test]
    fn road_provider_filters_by_window_and_network_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = GeoJsonRoadProvider::new(write_temp(dir.path(), "roads.geojson", ROADS));

        let all = provider.query(&query(NetworkType::All)).expect("all roads");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, RoadName::Single("Elm Street".to_string()));
        assert_eq!(
            all[1].name,
            RoadName::Aliases(vec!["Trail A".to_string(), "Trail B".to_string()])
        );

        let drive = provider.query(&query(NetworkType::Drive)).expect("drive roads");
        assert_eq!(drive.len(), 1);
    }

    #[test]
    fn road_provider_reports_missing_file_as_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = GeoJsonRoadProvider::new(dir.path().join("absent.geojson"));
        assert!(matches!(
            provider.query(&query(NetworkType::All)),
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn flood_provider_reads_polygons_and_zones() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_temp(
            dir.path(),
            "Dallas_FEMA_FloodLines.geojson",
            r#"{"type": "FeatureCollection", "features": [
              {"type": "Feature", "properties": {"FLD_ZONE": "AE"},
               "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
              {"type": "Feature", "properties": {}, "geometry": null}
            ]}"#,
        );
        let provider = GeoJsonFloodProvider::new(
            dir.path(),
            "{county}_FEMA_FloodLines.geojson",
            CrsDefinition::Geographic,
            "FLD_ZONE",
        );

        let collection = provider
            .query("Dallas")
            .expect("readable")
            .expect("file exists");
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].zone.as_deref(), Some("AE"));
        assert!(collection.features[0].geometry.is_areal());

        assert!(matches!(provider.query("Collin"), Ok(None)));
    }

    #[test]
    fn malformed_flood_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_temp(dir.path(), "Ellis_FEMA_FloodLines.geojson", "{ not json");
        let provider = GeoJsonFloodProvider::new(
            dir.path(),
            "{county}_FEMA_FloodLines.geojson",
            CrsDefinition::Geographic,
            "FLD_ZONE",
        );
        assert!(matches!(
            provider.query("Ellis"),
            Err(ProviderError::Parse { .. })
        ));
    }
}
