use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use vicmap_core::crs::CrsDefinition;
use vicmap_core::source::NetworkType;

/// 应用配置的根结构。所有字段均可省略，缺省值对应德州北中区网格坐标的出图习惯。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub roads: RoadsConfig,
    #[serde(default)]
    pub flood: FloodConfig,
    #[serde(default)]
    pub drawing: DrawingConfig,
    /// 以县名为键的地面坐标缩放系数表。
    #[serde(default)]
    pub counties: BTreeMap<String, CountyConfig>,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `VICMAP_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("VICMAP_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 按县名查找地面坐标缩放系数，忽略大小写与首尾空白。
    pub fn county_scale_factor(&self, county: &str) -> Option<f64> {
        let wanted = county.trim();
        self.counties
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, county)| county.scale_factor)
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    /// 出图使用的投影坐标系，所有几何最终统一到该坐标系。
    #[serde(default)]
    pub working: CrsDefinition,
    /// 缓冲圆的折线化顶点数。
    #[serde(default = "ProjectionConfig::default_buffer_segments")]
    pub buffer_segments: usize,
}

impl ProjectionConfig {
    fn default_buffer_segments() -> usize {
        64
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            working: CrsDefinition::default(),
            buffer_segments: Self::default_buffer_segments(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoadsConfig {
    /// 依次尝试的查询模式，前一种失败时回退到下一种。
    #[serde(default = "RoadsConfig::default_query_modes")]
    pub query_modes: Vec<NetworkType>,
    #[serde(default)]
    pub geojson: Option<PathBuf>,
    /// 为 `true` 时所有查询模式失败即终止出图。
    #[serde(default)]
    pub require_roads: bool,
}

impl RoadsConfig {
    fn default_query_modes() -> Vec<NetworkType> {
        vec![NetworkType::All, NetworkType::Drive]
    }
}

impl Default for RoadsConfig {
    fn default() -> Self {
        Self {
            query_modes: Self::default_query_modes(),
            geojson: None,
            require_roads: false,
        }
    }
}

/// 洪水面的绘制方式，同一次出图内统一生效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloodRender {
    /// 面要素退化为边界线后再裁剪。
    #[default]
    Boundary,
    /// 保留面要素，裁剪后绘制闭合轮廓。
    Outline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloodConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// 文件名模板，`{county}` 会被替换为县名。
    #[serde(default = "FloodConfig::default_file_pattern")]
    pub file_pattern: String,
    #[serde(default = "FloodConfig::default_source_crs")]
    pub source_crs: CrsDefinition,
    #[serde(default)]
    pub render: FloodRender,
    #[serde(default)]
    pub label_zones: bool,
    #[serde(default = "FloodConfig::default_zone_field")]
    pub zone_field: String,
}

impl FloodConfig {
    fn default_file_pattern() -> String {
        "{county}_FEMA_FloodLines.geojson".to_string()
    }

    fn default_source_crs() -> CrsDefinition {
        CrsDefinition::Geographic
    }

    fn default_zone_field() -> String {
        "FLD_ZONE".to_string()
    }
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_pattern: Self::default_file_pattern(),
            source_crs: Self::default_source_crs(),
            render: FloodRender::default(),
            label_zones: false,
            zone_field: Self::default_zone_field(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerStyle {
    pub name: String,
    #[serde(default = "LayerStyle::default_color")]
    pub color: i16,
}

impl LayerStyle {
    pub fn new(name: impl Into<String>, color: i16) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }

    fn default_color() -> i16 {
        7
    }
}

/// 地面坐标缩放的中心点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleOrigin {
    /// 以坐标原点为中心，地面坐标 = 网格坐标 × 系数。
    #[default]
    CoordinateOrigin,
    /// 以项目锚点为中心。
    Anchor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrawingConfig {
    #[serde(default = "DrawingConfig::default_roads_layer")]
    pub roads: LayerStyle,
    #[serde(default = "DrawingConfig::default_labels_layer")]
    pub labels: LayerStyle,
    #[serde(default = "DrawingConfig::default_flood_layer")]
    pub flood: LayerStyle,
    /// 设置后额外绘制缓冲范围边界。
    #[serde(default)]
    pub boundary: Option<LayerStyle>,
    /// 标注相对道路中点的垂直偏移（模型空间单位）。
    #[serde(default = "DrawingConfig::default_label_offset")]
    pub label_offset: f64,
    /// 字体选项到字体文件的映射。
    #[serde(default = "DrawingConfig::default_fonts")]
    pub fonts: BTreeMap<String, String>,
    #[serde(default = "DrawingConfig::default_fallback_style")]
    pub fallback_style: String,
    #[serde(default = "DrawingConfig::default_fallback_font")]
    pub fallback_font: String,
    #[serde(default)]
    pub scale_origin: ScaleOrigin,
}

impl DrawingConfig {
    fn default_roads_layer() -> LayerStyle {
        LayerStyle::new("ROADS", 7)
    }

    fn default_labels_layer() -> LayerStyle {
        LayerStyle::new("ROAD_LABELS", 2)
    }

    fn default_flood_layer() -> LayerStyle {
        LayerStyle::new("FEMA", 5)
    }

    fn default_label_offset() -> f64 {
        10.0
    }

    fn default_fonts() -> BTreeMap<String, String> {
        [
            ("simplex", "simplex.shx"),
            ("romans", "romans.shx"),
            ("arial", "arial.ttf"),
            ("calibri", "calibri.ttf"),
            ("times", "times.ttf"),
        ]
        .into_iter()
        .map(|(choice, font)| (choice.to_string(), font.to_string()))
        .collect()
    }

    fn default_fallback_style() -> String {
        "STANDARD".to_string()
    }

    fn default_fallback_font() -> String {
        "simplex.shx".to_string()
    }

    /// 查找字体选项对应的字体文件，忽略大小写。
    pub fn font_file(&self, choice: &str) -> Option<&str> {
        let wanted = choice.trim();
        self.fonts
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, font)| font.as_str())
    }
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            roads: Self::default_roads_layer(),
            labels: Self::default_labels_layer(),
            flood: Self::default_flood_layer(),
            boundary: None,
            label_offset: Self::default_label_offset(),
            fonts: Self::default_fonts(),
            fallback_style: Self::default_fallback_style(),
            fallback_font: Self::default_fallback_font(),
            scale_origin: ScaleOrigin::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CountyConfig {
    pub scale_factor: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
