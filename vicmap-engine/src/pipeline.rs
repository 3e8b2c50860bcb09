//! 一次出图的完整流程：范围 → 道路 → 缩放 → 标注，洪水线单独整合，最后汇总组装。

use std::fmt;

use tracing::{info, warn};
use vicmap_config::{AppConfig, ScaleOrigin};
use vicmap_core::document::Document;
use vicmap_core::geometry::{Point2, Shape};
use vicmap_core::source::{FloodlineProvider, RoadNetworkProvider};

use crate::aoi::AreaOfInterest;
use crate::assemble::{AssemblyCounts, DrawingAssembler, DrawingInputs};
use crate::clip::{ClipFn, clip_to_area};
use crate::errors::MapError;
use crate::flood::{FloodStatus, FloodlineIntegrator};
use crate::labels::{LabelPlacement, LabelPlacer};
use crate::naming::output_file_name;
use crate::request::{MapRequest, RequestError, check_scale_factor};
use crate::roads::{QueryPolicy, RoadNetworkAssembler, RoadStatus};
use crate::scale::{CoordinateBasis, ScaleTransform};

/// 一次出图的结果：内存中的图纸与推导出的文件名，尚未写盘。
#[derive(Debug, Clone)]
pub struct MapOutput {
    pub document: Document,
    pub file_name: String,
    pub summary: RunSummary,
}

/// 出图摘要，记录各图层实际包含的内容以及被降级的部分。
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub file_name: String,
    pub basis: CoordinateBasis,
    pub scale_factor: f64,
    pub roads: usize,
    pub road_status: RoadStatus,
    pub flood_status: FloodStatus,
    pub counts: AssemblyCounts,
    pub text_style: String,
    pub text_height: f64,
    pub font_fallback: bool,
    /// 裁剪或合并失败后保留原始几何的次数。
    pub geometry_fallbacks: usize,
}

impl RunSummary {
    /// 是否有任何数据因失败而被省略或降级。
    pub fn is_degraded(&self) -> bool {
        matches!(self.road_status, RoadStatus::Omitted { .. })
            || matches!(self.flood_status, FloodStatus::Unavailable { .. })
            || self.font_fallback
            || self.geometry_fallbacks > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "输出文件: {}", self.file_name)?;
        match self.basis {
            CoordinateBasis::Grid => writeln!(f, "坐标基准: 网格")?,
            CoordinateBasis::Surface => {
                writeln!(f, "坐标基准: 地面（系数 {}）", self.scale_factor)?
            }
        }
        match &self.road_status {
            RoadStatus::Included { network_type } => writeln!(
                f,
                "道路: {} 条（{} 条线，{} 个标注，查询模式 {network_type}）",
                self.roads, self.counts.road_polylines, self.counts.road_labels
            )?,
            RoadStatus::Omitted { .. } => writeln!(
                f,
                "道路: 已省略（{}）",
                self.road_status.attempts_summary()
            )?,
        }
        match &self.flood_status {
            FloodStatus::Skipped => writeln!(f, "洪水线: 未指定县，已跳过")?,
            FloodStatus::Absent => writeln!(f, "洪水线: 该县无数据")?,
            FloodStatus::Unavailable { error } => writeln!(f, "洪水线: 读取失败（{error}）")?,
            FloodStatus::Included { features } => writeln!(
                f,
                "洪水线: {features} 个要素（{} 条线，{} 个标注）",
                self.counts.flood_polylines, self.counts.flood_labels
            )?,
        }
        if self.counts.boundary_polylines > 0 {
            writeln!(f, "范围线: 已绘制")?;
        }
        if self.geometry_fallbacks > 0 {
            writeln!(f, "几何降级: {} 处保留原始几何", self.geometry_fallbacks)?;
        }
        write!(
            f,
            "文字样式: {}{}，字高 {}",
            self.text_style,
            if self.font_fallback { "（缺省）" } else { "" },
            self.text_height
        )
    }
}

/// 出图流程。配置以引用传入，多个流程可以使用不同配置同时存在。
pub struct VicinityMapPipeline<'a> {
    config: &'a AppConfig,
    policy: QueryPolicy,
    clip: ClipFn,
}

impl<'a> VicinityMapPipeline<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            policy: QueryPolicy::new(config.roads.query_modes.clone()),
            clip: clip_to_area,
        }
    }

    /// 替换道路与洪水线共用的裁剪函数。
    pub fn with_clipper(mut self, clip: ClipFn) -> Self {
        self.clip = clip;
        self
    }

    /// 除参数错误、锚点无法换算以及强制要求道路时道路全部失败之外，
    /// 其余问题都降级处理并反映在摘要中。
    pub fn run<R, F>(
        &self,
        request: &MapRequest,
        roads: &R,
        floodlines: &F,
    ) -> Result<MapOutput, MapError>
    where
        R: RoadNetworkProvider + ?Sized,
        F: FloodlineProvider + ?Sized,
    {
        request.validate()?;
        let working_crs = &self.config.projection.working;
        let anchor = request.anchor.as_point();
        let transform = self.resolve_transform(request, anchor)?;
        let file_name = output_file_name(
            &request.project_name,
            request.county(),
            request.drawing_scale,
            transform.basis(),
        )?;
        info!(
            project = %request.project_name,
            scale = %request.drawing_scale,
            basis = %transform.basis(),
            factor = transform.factor(),
            "开始生成位置图"
        );

        let aoi = AreaOfInterest::build(
            anchor,
            request.buffer_miles,
            working_crs,
            self.config.projection.buffer_segments,
        )?;

        let mut road_assembly = RoadNetworkAssembler::new(&self.policy, working_crs)
            .with_clipper(self.clip)
            .assemble(roads, &aoi);
        if self.config.roads.require_roads
            && matches!(road_assembly.status, RoadStatus::Omitted { .. })
        {
            return Err(MapError::RoadsUnavailable {
                attempts: road_assembly.status.attempts_summary(),
            });
        }
        for road in &mut road_assembly.roads {
            transform.apply(&mut road.geometry);
        }

        let placer = LabelPlacer::new(self.config.drawing.label_offset);
        let road_labels: Vec<LabelPlacement> = road_assembly
            .roads
            .iter()
            .filter_map(|road| {
                let placement = placer.place(&road.label, &road.geometry);
                if placement.is_none() {
                    warn!(road = %road.label, "道路几何退化，未生成标注");
                }
                placement
            })
            .collect();

        let mut flood = FloodlineIntegrator::new(working_crs, self.config.flood.render)
            .with_clipper(self.clip)
            .integrate(floodlines, request.county(), &aoi);
        for feature in &mut flood.features {
            transform.apply(&mut feature.geometry);
        }
        let flood_labels: Vec<LabelPlacement> = if self.config.flood.label_zones {
            flood
                .features
                .iter()
                .filter_map(|feature| {
                    let zone = feature.zone.as_deref()?;
                    placer.place(zone, &feature.geometry)
                })
                .collect()
        } else {
            Vec::new()
        };

        let boundary: Option<Shape> = self.config.drawing.boundary.as_ref().map(|_| {
            let mut outline = aoi.boundary_shape();
            transform.apply(&mut outline);
            outline
        });

        let assembler = DrawingAssembler::new(
            &self.config.drawing,
            &request.font,
            request.text_plot_height,
            request.drawing_scale,
        );
        let mut document = Document::new();
        let counts = assembler.assemble(
            &mut document,
            &DrawingInputs {
                roads: &road_assembly.roads,
                road_labels: &road_labels,
                flood: &flood.features,
                flood_labels: &flood_labels,
                boundary: boundary.as_ref(),
            },
        );

        let summary = RunSummary {
            file_name: file_name.clone(),
            basis: transform.basis(),
            scale_factor: transform.factor(),
            roads: road_assembly.roads.len(),
            road_status: road_assembly.status,
            flood_status: flood.status,
            counts,
            text_style: assembler.text_style().name.clone(),
            text_height: assembler.text_height(),
            font_fallback: assembler.text_style().is_fallback,
            geometry_fallbacks: road_assembly.clip_fallbacks
                + road_assembly.merge_fallbacks
                + flood.clip_fallbacks,
        };
        info!(
            file = %file_name,
            roads = summary.roads,
            road_labels = counts.road_labels,
            flood_polylines = counts.flood_polylines,
            degraded = summary.is_degraded(),
            "位置图生成完成"
        );
        Ok(MapOutput {
            document,
            file_name,
            summary,
        })
    }

    /// 地面坐标的系数优先取请求中的显式值，其次按县名查配置。
    fn resolve_transform(
        &self,
        request: &MapRequest,
        anchor: Point2,
    ) -> Result<ScaleTransform, RequestError> {
        match request.basis {
            CoordinateBasis::Grid => Ok(ScaleTransform::grid()),
            CoordinateBasis::Surface => {
                if self.config.projection.working.is_geographic() {
                    return Err(RequestError::SurfaceOnGeographic);
                }
                let factor = request
                    .scale_factor
                    .or_else(|| {
                        request
                            .county()
                            .and_then(|county| self.config.county_scale_factor(county))
                    })
                    .ok_or_else(|| RequestError::MissingScaleFactor {
                        county: request.county().map(str::to_string),
                    })?;
                let factor = check_scale_factor(factor)?;
                let origin = match self.config.drawing.scale_origin {
                    ScaleOrigin::CoordinateOrigin => Point2::new(0.0, 0.0),
                    ScaleOrigin::Anchor => anchor,
                };
                ScaleTransform::surface(factor, origin)
            }
        }
    }
}
