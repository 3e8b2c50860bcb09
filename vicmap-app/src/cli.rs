use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use vicmap_config::AppConfig;
use vicmap_core::source::{FloodlineProvider, NoFloodlines, NoRoadNetwork, RoadNetworkProvider};
use vicmap_engine::{
    AnchorPoint, CoordinateBasis, DrawingScale, MapRequest, RunSummary, VicinityMapPipeline,
};
use vicmap_io::{DocumentSaver, DxfFacade, GeoJsonFloodProvider, GeoJsonRoadProvider};

#[derive(Parser, Debug)]
#[command(name = "vicmap", version, about = "根据测量锚点生成带标注的位置图 DXF")]
pub struct Args {
    /// 项目名称，清理非法字符后用于输出文件名
    #[arg(long)]
    pub project: String,

    /// 锚点北坐标（工作坐标系单位）
    #[arg(long, allow_negative_numbers = true)]
    pub northing: f64,

    /// 锚点东坐标（工作坐标系单位）
    #[arg(long, allow_negative_numbers = true)]
    pub easting: f64,

    #[arg(long = "radius-miles", default_value_t = 3.0)]
    pub radius_miles: f64,

    /// 出图比例，1 英寸对应的英尺数
    #[arg(long, default_value_t = 100)]
    pub scale: u32,

    /// 文字打印高度
    #[arg(long = "text-height", default_value_t = 0.08)]
    pub text_height: f64,

    #[arg(long, default_value = "simplex")]
    pub font: String,

    #[arg(long)]
    pub county: Option<String>,

    #[arg(long, value_enum, default_value = "grid")]
    pub basis: BasisArg,

    /// 地面坐标缩放系数；缺省时按县名查配置
    #[arg(long = "scale-factor")]
    pub scale_factor: Option<f64>,

    /// 道路 GeoJSON 文件，覆盖配置中的 `roads.geojson`
    #[arg(long)]
    pub roads: Option<PathBuf>,

    /// 洪水线目录，覆盖配置中的 `flood.data_dir`
    #[arg(long = "flood-dir")]
    pub flood_dir: Option<PathBuf>,

    #[arg(long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisArg {
    Grid,
    Surface,
}

impl From<BasisArg> for CoordinateBasis {
    fn from(value: BasisArg) -> Self {
        match value {
            BasisArg::Grid => CoordinateBasis::Grid,
            BasisArg::Surface => CoordinateBasis::Surface,
        }
    }
}

impl Args {
    pub fn to_request(&self) -> Result<MapRequest> {
        Ok(MapRequest {
            project_name: self.project.clone(),
            anchor: AnchorPoint::new(self.northing, self.easting),
            buffer_miles: self.radius_miles,
            drawing_scale: DrawingScale::new(self.scale)?,
            text_plot_height: self.text_height,
            font: self.font.clone(),
            county: self.county.clone(),
            basis: self.basis.into(),
            scale_factor: self.scale_factor,
        })
    }
}

fn road_provider(args: &Args, config: &AppConfig) -> Box<dyn RoadNetworkProvider> {
    match args.roads.clone().or_else(|| config.roads.geojson.clone()) {
        Some(path) => {
            info!(path = %path.display(), "使用 GeoJSON 道路数据");
            Box::new(GeoJsonRoadProvider::new(path))
        }
        None => {
            warn!("未配置道路数据源，道路图层将为空");
            Box::new(NoRoadNetwork)
        }
    }
}

fn flood_provider(args: &Args, config: &AppConfig) -> Box<dyn FloodlineProvider> {
    match args.flood_dir.clone().or_else(|| config.flood.data_dir.clone()) {
        Some(dir) => Box::new(GeoJsonFloodProvider::new(
            dir,
            config.flood.file_pattern.clone(),
            config.flood.source_crs.clone(),
            config.flood.zone_field.clone(),
        )),
        None => Box::new(NoFloodlines),
    }
}

/// 运行一次出图并写盘，返回摘要。
pub fn run(args: &Args, config: &AppConfig) -> Result<RunSummary> {
    let request = args.to_request()?;
    let roads = road_provider(args, config);
    let floodlines = flood_provider(args, config);

    let output =
        VicinityMapPipeline::new(config).run(&request, roads.as_ref(), floodlines.as_ref())?;

    let path = args.output_dir.join(&output.file_name);
    DxfFacade::new()
        .save(&output.document, &path)
        .with_context(|| format!("无法写出位置图 {}", path.display()))?;
    info!(path = %path.display(), "位置图已保存");
    Ok(output.summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_with_defaults() {
        let args = Args::try_parse_from([
            "vicmap",
            "--project",
            "Cedar Ridge",
            "--northing",
            "6963281.3",
            "--easting",
            "2466606.4",
            "--basis",
            "surface",
            "--scale-factor",
            "1.00015271",
        ])
        .expect("valid flags");
        assert_eq!(args.scale, 100);
        assert!((args.radius_miles - 3.0).abs() < 1e-12);
        assert_eq!(args.font, "simplex");
        assert_eq!(args.output_dir, PathBuf::from("."));

        let request = args.to_request().expect("request");
        assert_eq!(request.basis, CoordinateBasis::Surface);
        assert_eq!(request.scale_factor, Some(1.00015271));
        assert_eq!(request.anchor.as_point().x(), 2466606.4);
    }

    #[test]
    fn unsupported_scale_is_rejected() {
        let args = Args::try_parse_from([
            "vicmap",
            "--project",
            "Lot 7",
            "--northing",
            "1",
            "--easting",
            "1",
            "--scale",
            "75",
        ])
        .expect("flags parse");
        assert!(args.to_request().is_err());
    }

    #[test]
    fn missing_required_flag_fails_to_parse() {
        assert!(Args::try_parse_from(["vicmap", "--project", "Lot 7"]).is_err());
    }
}
