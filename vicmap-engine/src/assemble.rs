//! 把整理好的几何与标注写入绘图输出端。

use tracing::{debug, warn};
use vicmap_config::{DrawingConfig, LayerStyle};
use vicmap_core::document::DrawingSink;
use vicmap_core::geometry::Shape;
use vicmap_core::source::FloodFeature;

use crate::labels::LabelPlacement;
use crate::request::DrawingScale;
use crate::roads::NamedRoad;

/// 解析后的文字样式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTextStyle {
    pub name: String,
    pub font: String,
    /// 请求的字体未登记，改用了缺省样式。
    pub is_fallback: bool,
}

/// 已知字体生成 `{FONT}_STYLE` 样式；未知字体回退到配置的缺省样式。
pub fn resolve_text_style(font_choice: &str, drawing: &DrawingConfig) -> ResolvedTextStyle {
    match drawing.font_file(font_choice) {
        Some(font) => ResolvedTextStyle {
            name: format!("{}_STYLE", font_choice.trim().to_ascii_uppercase()),
            font: font.to_string(),
            is_fallback: false,
        },
        None => {
            warn!(
                font = font_choice,
                fallback = %drawing.fallback_style,
                "未知字体，使用缺省文字样式"
            );
            ResolvedTextStyle {
                name: drawing.fallback_style.clone(),
                font: drawing.fallback_font.clone(),
                is_fallback: true,
            }
        }
    }
}

/// 模型空间字高 = 打印字高 × 出图比例。
#[inline]
pub fn model_text_height(plot_height: f64, scale: DrawingScale) -> f64 {
    plot_height * scale.factor()
}

/// 组装一张图纸所需的全部输入，几何均已位于同一坐标系。
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawingInputs<'a> {
    pub roads: &'a [NamedRoad],
    pub road_labels: &'a [LabelPlacement],
    pub flood: &'a [FloodFeature],
    pub flood_labels: &'a [LabelPlacement],
    pub boundary: Option<&'a Shape>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyCounts {
    pub road_polylines: usize,
    pub road_labels: usize,
    pub flood_polylines: usize,
    pub flood_labels: usize,
    pub boundary_polylines: usize,
}

pub struct DrawingAssembler<'a> {
    drawing: &'a DrawingConfig,
    style: ResolvedTextStyle,
    text_height: f64,
}

impl<'a> DrawingAssembler<'a> {
    pub fn new(
        drawing: &'a DrawingConfig,
        font_choice: &str,
        plot_height: f64,
        scale: DrawingScale,
    ) -> Self {
        Self {
            drawing,
            style: resolve_text_style(font_choice, drawing),
            text_height: model_text_height(plot_height, scale),
        }
    }

    #[inline]
    pub fn text_style(&self) -> &ResolvedTextStyle {
        &self.style
    }

    #[inline]
    pub fn text_height(&self) -> f64 {
        self.text_height
    }

    /// 先登记图层与样式，再按道路、道路标注、洪水线、范围线的顺序输出图元。
    /// 洪水图层即使没有要素也会登记。
    pub fn assemble<S>(&self, sink: &mut S, inputs: &DrawingInputs<'_>) -> AssemblyCounts
    where
        S: DrawingSink + ?Sized,
    {
        let drawing = self.drawing;
        register(sink, &drawing.roads);
        register(sink, &drawing.labels);
        register(sink, &drawing.flood);
        let boundary_layer = drawing.boundary.as_ref().filter(|_| inputs.boundary.is_some());
        if let Some(layer) = boundary_layer {
            register(sink, layer);
        }
        sink.add_text_style(&self.style.name, &self.style.font);

        let mut counts = AssemblyCounts::default();
        for road in inputs.roads {
            counts.road_polylines += emit_shape(sink, &road.geometry, &drawing.roads.name);
        }
        for label in inputs.road_labels {
            self.emit_label(sink, label, &drawing.labels.name);
            counts.road_labels += 1;
        }
        for feature in inputs.flood {
            counts.flood_polylines += emit_shape(sink, &feature.geometry, &drawing.flood.name);
        }
        for label in inputs.flood_labels {
            self.emit_label(sink, label, &drawing.flood.name);
            counts.flood_labels += 1;
        }
        if let (Some(layer), Some(boundary)) = (boundary_layer, inputs.boundary) {
            counts.boundary_polylines += emit_shape(sink, boundary, &layer.name);
        }

        debug!(?counts, style = %self.style.name, text_height = self.text_height, "图纸组装完成");
        counts
    }

    fn emit_label<S>(&self, sink: &mut S, label: &LabelPlacement, layer: &str)
    where
        S: DrawingSink + ?Sized,
    {
        sink.add_text(
            &label.text,
            label.insert,
            label.rotation,
            self.text_height,
            layer,
            &self.style.name,
        );
    }
}

fn register<S>(sink: &mut S, layer: &LayerStyle)
where
    S: DrawingSink + ?Sized,
{
    sink.add_layer(&layer.name, layer.color);
}

/// 每个部分（或多边形的每个环）输出一条多段线。
fn emit_shape<S>(sink: &mut S, shape: &Shape, layer: &str) -> usize
where
    S: DrawingSink + ?Sized,
{
    let mut emitted = 0;
    for path in shape.paths() {
        if path.len() < 2 {
            continue;
        }
        sink.add_polyline(path.points(), path.is_closed(), layer);
        emitted += 1;
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicmap_core::document::{Document, Entity, EntityId};
    use vicmap_core::geometry::{LinePath, Point2, PolygonShape};

    fn scale(value: u32) -> DrawingScale {
        DrawingScale::new(value).expect("valid scale")
    }

    fn roads() -> Vec<NamedRoad> {
        vec![
            NamedRoad {
                label: "Elm Street".to_string(),
                geometry: Shape::Line(LinePath::new(vec![
                    Point2::new(0.0, 0.0),
                    Point2::new(100.0, 0.0),
                ])),
            },
            NamedRoad {
                label: "Oak Avenue".to_string(),
                geometry: Shape::MultiLine(vec![
                    LinePath::new(vec![Point2::new(0.0, 50.0), Point2::new(10.0, 50.0)]),
                    LinePath::new(vec![Point2::new(40.0, 50.0), Point2::new(90.0, 50.0)]),
                ]),
            },
        ]
    }

    #[test]
    fn known_fonts_get_their_own_style() {
        let drawing = DrawingConfig::default();
        let style = resolve_text_style("Romans", &drawing);
        assert_eq!(style.name, "ROMANS_STYLE");
        assert_eq!(style.font, "romans.shx");
        assert!(!style.is_fallback);

        let fallback = resolve_text_style("comic", &drawing);
        assert_eq!(fallback.name, "STANDARD");
        assert_eq!(fallback.font, "simplex.shx");
        assert!(fallback.is_fallback);
    }

    #[test]
    fn text_height_scales_with_drawing_scale() {
        assert!((model_text_height(0.08, scale(100)) - 8.0).abs() < 1e-12);
        assert!((model_text_height(0.1, scale(500)) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn assembles_layers_styles_and_entities() {
        let drawing = DrawingConfig::default();
        let roads = roads();
        let labels = vec![
            LabelPlacement {
                text: "Elm Street".to_string(),
                insert: Point2::new(50.0, 10.0),
                rotation: 0.0,
                part_index: 0,
            },
            LabelPlacement {
                text: "Oak Avenue".to_string(),
                insert: Point2::new(65.0, 60.0),
                rotation: 0.0,
                part_index: 1,
            },
        ];
        let flood = vec![FloodFeature {
            geometry: Shape::Polygon(PolygonShape::new(
                LinePath::new(vec![
                    Point2::new(0.0, 0.0),
                    Point2::new(5.0, 0.0),
                    Point2::new(5.0, 5.0),
                    Point2::new(0.0, 0.0),
                ]),
                Vec::new(),
            )),
            zone: Some("AE".to_string()),
        }];

        let mut doc = Document::new();
        let assembler = DrawingAssembler::new(&drawing, "arial", 0.08, scale(100));
        let counts = assembler.assemble(
            &mut doc,
            &DrawingInputs {
                roads: &roads,
                road_labels: &labels,
                flood: &flood,
                ..DrawingInputs::default()
            },
        );

        assert_eq!(
            counts,
            AssemblyCounts {
                road_polylines: 3,
                road_labels: 2,
                flood_polylines: 1,
                flood_labels: 0,
                boundary_polylines: 0,
            }
        );
        assert_eq!(doc.layer("ROADS").map(|layer| layer.color), Some(7));
        assert_eq!(doc.layer("ROAD_LABELS").map(|layer| layer.color), Some(2));
        assert_eq!(doc.layer("FEMA").map(|layer| layer.color), Some(5));
        assert_eq!(
            doc.text_style("ARIAL_STYLE").map(|style| style.font.as_str()),
            Some("arial.ttf")
        );
        let text = doc
            .entities_on_layer("ROAD_LABELS")
            .find_map(|entity| match entity {
                Entity::Text(text) => Some(text),
                _ => None,
            })
            .expect("label text");
        assert!((text.height - 8.0).abs() < 1e-12);
        assert_eq!(text.style, "ARIAL_STYLE");
        let ring_closed = doc.entities_on_layer("FEMA").any(|entity| match entity {
            Entity::Polyline(polyline) => polyline.is_closed,
            _ => false,
        });
        assert!(ring_closed);
    }

    #[test]
    fn flood_layer_is_registered_even_when_empty() {
        let drawing = DrawingConfig::default();
        let mut doc = Document::new();
        DrawingAssembler::new(&drawing, "simplex", 0.1, scale(50))
            .assemble(&mut doc, &DrawingInputs::default());
        assert!(doc.layer("FEMA").is_some());
        assert_eq!(doc.entities_on_layer("FEMA").count(), 0);
    }

    #[test]
    fn boundary_needs_both_layer_and_geometry() {
        let mut drawing = DrawingConfig::default();
        let outline = Shape::Line(LinePath::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 0.0),
        ]));

        let mut doc = Document::new();
        let counts = DrawingAssembler::new(&drawing, "simplex", 0.1, scale(50)).assemble(
            &mut doc,
            &DrawingInputs {
                boundary: Some(&outline),
                ..DrawingInputs::default()
            },
        );
        assert_eq!(counts.boundary_polylines, 0);

        drawing.boundary = Some(LayerStyle::new("PROJECT_BOUNDARY", 1));
        let mut doc = Document::new();
        let counts = DrawingAssembler::new(&drawing, "simplex", 0.1, scale(50)).assemble(
            &mut doc,
            &DrawingInputs {
                boundary: Some(&outline),
                ..DrawingInputs::default()
            },
        );
        assert_eq!(counts.boundary_polylines, 1);
        assert_eq!(doc.entities_on_layer("PROJECT_BOUNDARY").count(), 1);
    }

    /// 只记录调用顺序的输出端，验证组装器不依赖具体文档类型。
    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
    }

    impl DrawingSink for RecordingSink {
        fn add_layer(&mut self, name: &str, _color: i16) {
            self.calls.push(format!("layer:{name}"));
        }

        fn add_text_style(&mut self, name: &str, _font: &str) {
            self.calls.push(format!("style:{name}"));
        }

        fn add_polyline(&mut self, _points: &[Point2], _is_closed: bool, layer: &str) -> EntityId {
            self.calls.push(format!("polyline:{layer}"));
            EntityId::new(self.calls.len() as u64)
        }

        fn add_text(
            &mut self,
            content: &str,
            _insert: Point2,
            _rotation: f64,
            _height: f64,
            layer: &str,
            _style: &str,
        ) -> EntityId {
            self.calls.push(format!("text:{layer}:{content}"));
            EntityId::new(self.calls.len() as u64)
        }
    }

    #[test]
    fn registration_precedes_primitives() {
        let drawing = DrawingConfig::default();
        let roads = roads();
        let mut sink = RecordingSink::default();
        DrawingAssembler::new(&drawing, "times", 0.1, scale(20)).assemble(
            &mut sink,
            &DrawingInputs {
                roads: &roads[..1],
                ..DrawingInputs::default()
            },
        );
        assert_eq!(
            sink.calls,
            vec![
                "layer:ROADS",
                "layer:ROAD_LABELS",
                "layer:FEMA",
                "style:TIMES_STYLE",
                "polyline:ROADS",
            ]
        );
    }
}
