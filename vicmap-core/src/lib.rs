pub mod crs;
pub mod source;

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 长度比较使用的容差，低于该值的线段视为退化。
    pub const LENGTH_EPSILON: f64 = 1e-9;

    /// 二维点，内部以 `glam::DVec2` 表示；投影坐标下 x 为东坐标、y 为北坐标，
    /// 经纬度坐标下 x 为经度、y 为纬度。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        /// 以 `origin` 为中心做均匀缩放。
        #[inline]
        pub fn scale_about(self, origin: Point2, factor: f64) -> Self {
            Self(origin.0 + (self.0 - origin.0) * factor)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        /// 按角度（度，数学正方向，0° 指向 +x）构造指定长度的向量。
        #[inline]
        pub fn from_angle_degrees(angle: f64, length: f64) -> Self {
            let radians = angle.to_radians();
            Self(DVec2::new(radians.cos(), radians.sin()) * length)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 经纬度（度）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct LonLat {
        pub lon: f64,
        pub lat: f64,
    }

    impl LonLat {
        #[inline]
        pub fn new(lon: f64, lat: f64) -> Self {
            Self { lon, lat }
        }

        #[inline]
        pub fn as_point(self) -> Point2 {
            Point2::new(self.lon, self.lat)
        }

        #[inline]
        pub fn from_point(point: Point2) -> Self {
            Self::new(point.x(), point.y())
        }
    }

    /// 轴对齐边界框，用于估算文档/几何范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let min_vec = self.min.as_vec2();
            let max_vec = self.max.as_vec2();
            let center = (min_vec + max_vec) * 0.5;
            Point2::from_vec(center)
        }

        pub fn intersects(&self, other: &Bounds2D) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            self.min.x() <= other.max.x()
                && other.min.x() <= self.max.x()
                && self.min.y() <= other.max.y()
                && other.min.y() <= self.max.y()
        }
    }

    /// 有序折线。闭合环以首尾重复点表示。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LinePath(Vec<Point2>);

    impl LinePath {
        #[inline]
        pub fn new(points: Vec<Point2>) -> Self {
            Self(points)
        }

        #[inline]
        pub fn points(&self) -> &[Point2] {
            &self.0
        }

        #[inline]
        pub fn points_mut(&mut self) -> &mut [Point2] {
            &mut self.0
        }

        #[inline]
        pub fn into_points(self) -> Vec<Point2> {
            self.0
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.0.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }

        #[inline]
        pub fn start(&self) -> Option<Point2> {
            self.0.first().copied()
        }

        #[inline]
        pub fn end(&self) -> Option<Point2> {
            self.0.last().copied()
        }

        pub fn length(&self) -> f64 {
            self.0
                .windows(2)
                .map(|pair| pair[0].distance(pair[1]))
                .sum()
        }

        /// 少于两个点或总长为 0 的折线无法确定方向与中点。
        pub fn is_degenerate(&self) -> bool {
            self.0.len() < 2 || self.length() <= LENGTH_EPSILON
        }

        pub fn is_closed(&self) -> bool {
            match (self.start(), self.end()) {
                (Some(start), Some(end)) => self.0.len() > 2 && start == end,
                _ => false,
            }
        }

        pub fn reversed(&self) -> Self {
            let mut points = self.0.clone();
            points.reverse();
            Self(points)
        }

        /// 按归一化长度比例插值（0.0 为起点，1.0 为终点）。
        pub fn interpolate(&self, fraction: f64) -> Option<Point2> {
            let first = self.start()?;
            let total = self.length();
            if total <= LENGTH_EPSILON {
                return Some(first);
            }
            let target = total * fraction.clamp(0.0, 1.0);
            let mut walked = 0.0;
            for pair in self.0.windows(2) {
                let segment = pair[0].distance(pair[1]);
                if segment <= 0.0 {
                    continue;
                }
                if walked + segment >= target {
                    let t = (target - walked) / segment;
                    return Some(Point2::from_vec(pair[0].as_vec2().lerp(pair[1].as_vec2(), t)));
                }
                walked += segment;
            }
            self.end()
        }

        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            for point in &self.0 {
                bounds.include_point(*point);
            }
            bounds
        }

        /// 环的有向面积（逆时针为正）。
        pub fn signed_area(&self) -> f64 {
            let points = &self.0;
            if points.len() < 3 {
                return 0.0;
            }
            let mut twice = 0.0;
            for pair in points.windows(2) {
                twice += pair[0].x() * pair[1].y() - pair[1].x() * pair[0].y();
            }
            if let (Some(first), Some(last)) = (points.first(), points.last()) {
                if first != last {
                    twice += last.x() * first.y() - first.x() * last.y();
                }
            }
            twice * 0.5
        }
    }

    impl From<Vec<Point2>> for LinePath {
        fn from(value: Vec<Point2>) -> Self {
            Self(value)
        }
    }

    /// 多边形：一个外环与若干内环，环均为首尾闭合的折线。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PolygonShape {
        pub exterior: LinePath,
        pub interiors: Vec<LinePath>,
    }

    impl PolygonShape {
        #[inline]
        pub fn new(exterior: LinePath, interiors: Vec<LinePath>) -> Self {
            Self {
                exterior,
                interiors,
            }
        }

        pub fn rings(&self) -> impl Iterator<Item = &LinePath> {
            std::iter::once(&self.exterior).chain(self.interiors.iter())
        }

        pub fn area(&self) -> f64 {
            let holes: f64 = self.interiors.iter().map(|ring| ring.signed_area().abs()).sum();
            (self.exterior.signed_area().abs() - holes).max(0.0)
        }
    }

    /// 几何体的封闭变体，消费方需穷尽处理每一种形态。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Shape {
        Line(LinePath),
        MultiLine(Vec<LinePath>),
        Polygon(PolygonShape),
        MultiPolygon(Vec<PolygonShape>),
    }

    impl Shape {
        /// 由若干折线组成线几何；单条时退化为 `Line`，为空时返回 `None`。
        pub fn from_lines(mut lines: Vec<LinePath>) -> Option<Shape> {
            match lines.len() {
                0 => None,
                1 => lines.pop().map(Shape::Line),
                _ => Some(Shape::MultiLine(lines)),
            }
        }

        pub fn from_polygons(mut polygons: Vec<PolygonShape>) -> Option<Shape> {
            match polygons.len() {
                0 => None,
                1 => polygons.pop().map(Shape::Polygon),
                _ => Some(Shape::MultiPolygon(polygons)),
            }
        }

        pub fn kind(&self) -> &'static str {
            match self {
                Shape::Line(_) => "Line",
                Shape::MultiLine(_) => "MultiLine",
                Shape::Polygon(_) => "Polygon",
                Shape::MultiPolygon(_) => "MultiPolygon",
            }
        }

        #[inline]
        pub fn is_areal(&self) -> bool {
            matches!(self, Shape::Polygon(_) | Shape::MultiPolygon(_))
        }

        /// 所有可绘制的折线：线几何的各部分，或多边形的全部环。
        pub fn paths(&self) -> Vec<&LinePath> {
            match self {
                Shape::Line(line) => vec![line],
                Shape::MultiLine(lines) => lines.iter().collect(),
                Shape::Polygon(polygon) => polygon.rings().collect(),
                Shape::MultiPolygon(polygons) => {
                    polygons.iter().flat_map(PolygonShape::rings).collect()
                }
            }
        }

        /// 参与标注的部分：线几何的各部分，或各多边形的外环。
        pub fn label_parts(&self) -> Vec<&LinePath> {
            match self {
                Shape::Line(line) => vec![line],
                Shape::MultiLine(lines) => lines.iter().collect(),
                Shape::Polygon(polygon) => vec![&polygon.exterior],
                Shape::MultiPolygon(polygons) => {
                    polygons.iter().map(|polygon| &polygon.exterior).collect()
                }
            }
        }

        #[inline]
        pub fn part_count(&self) -> usize {
            self.paths().len()
        }

        pub fn point_count(&self) -> usize {
            self.paths().iter().map(|path| path.len()).sum()
        }

        pub fn is_empty(&self) -> bool {
            self.paths().iter().all(|path| path.is_empty())
        }

        pub fn is_finite(&self) -> bool {
            self.paths()
                .iter()
                .all(|path| path.points().iter().all(|point| point.is_finite()))
        }

        /// 逐点变换，保持部分数量、点数与点序不变。
        pub fn map_points(&mut self, mut f: impl FnMut(Point2) -> Point2) {
            let mut apply = |path: &mut LinePath| {
                for point in path.points_mut() {
                    *point = f(*point);
                }
            };
            match self {
                Shape::Line(line) => apply(line),
                Shape::MultiLine(lines) => lines.iter_mut().for_each(&mut apply),
                Shape::Polygon(polygon) => {
                    apply(&mut polygon.exterior);
                    polygon.interiors.iter_mut().for_each(&mut apply);
                }
                Shape::MultiPolygon(polygons) => {
                    for polygon in polygons {
                        apply(&mut polygon.exterior);
                        polygon.interiors.iter_mut().for_each(&mut apply);
                    }
                }
            }
        }

        /// 面几何退化为其边界线；线几何原样返回。
        pub fn boundary(&self) -> Shape {
            match self {
                Shape::Line(_) | Shape::MultiLine(_) => self.clone(),
                Shape::Polygon(_) | Shape::MultiPolygon(_) => {
                    let rings = self.paths().into_iter().cloned().collect::<Vec<_>>();
                    Shape::from_lines(rings).unwrap_or(Shape::MultiLine(Vec::new()))
                }
            }
        }

        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            for path in self.paths() {
                bounds.include_bounds(&path.bounds());
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }
    }
}

pub mod document {
    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2};

    /// DXF 中默认存在的图层与文字样式。
    pub const DEFAULT_LAYER: &str = "0";
    pub const DEFAULT_TEXT_STYLE: &str = "STANDARD";
    pub const DEFAULT_TEXT_FONT: &str = "txt";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 图层，颜色为 AutoCAD 颜色索引（ACI）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub color: i16,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                color: 7,
                is_visible: true,
            }
        }

        #[inline]
        pub fn with_color(name: impl Into<String>, color: i16) -> Self {
            Self {
                color,
                ..Self::new(name)
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TextStyle {
        pub name: String,
        pub font: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Polyline(Polyline),
        Text(Text),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
            }
        }

        /// 计算实体的 2D 轴对齐范围，文本退化为插入点。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Polyline(polyline) => {
                    for vertex in &polyline.vertices {
                        bounds.include_point(*vertex);
                    }
                }
                Entity::Text(text) => {
                    bounds.include_point(text.insert);
                }
            }
            if bounds.is_empty() {
                None
            } else {
                Some(bounds)
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        pub layer: String,
    }

    /// 单行文字，旋转角以度储存（DXF 组码 50 的约定）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
        pub style: String,
    }

    /// 绘图输出端：登记图层与文字样式，并按顺序追加图元。
    pub trait DrawingSink {
        fn add_layer(&mut self, name: &str, color: i16);
        fn add_text_style(&mut self, name: &str, font: &str);
        fn add_polyline(&mut self, points: &[Point2], is_closed: bool, layer: &str) -> EntityId;
        fn add_text(
            &mut self,
            content: &str,
            insert: Point2,
            rotation: f64,
            height: f64,
            layer: &str,
            style: &str,
        ) -> EntityId;
    }

    /// 内存中的图纸文档，图层与样式保持登记顺序，便于确定性输出。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: Vec<Layer>,
        text_styles: Vec<TextStyle>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer(DEFAULT_LAYER);
            doc.text_styles.push(TextStyle {
                name: DEFAULT_TEXT_STYLE.to_string(),
                font: DEFAULT_TEXT_FONT.to_string(),
            });
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            if self.layer(key).is_none() {
                self.layers.push(Layer::new(key));
            }
        }

        #[inline]
        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.iter().find(|layer| layer.name == name)
        }

        #[inline]
        pub fn text_style(&self, name: &str) -> Option<&TextStyle> {
            self.text_styles.iter().find(|style| style.name == name)
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.iter()
        }

        #[inline]
        pub fn text_styles(&self) -> impl Iterator<Item = &TextStyle> {
            self.text_styles.iter()
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn entities_on_layer<'a>(
            &'a self,
            layer: &'a str,
        ) -> impl Iterator<Item = &'a Entity> + 'a {
            self.entities
                .iter()
                .map(|(_, entity)| entity)
                .filter(move |entity| entity.layer_name() == layer)
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities.iter().find_map(|(entity_id, entity)| {
                if entity_id.get() == id.get() {
                    Some(entity)
                } else {
                    None
                }
            })
        }

        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            let mut has = false;
            for (_, entity) in &self.entities {
                if let Some(entity_bounds) = entity.bounds() {
                    bounds.include_bounds(&entity_bounds);
                    has = true;
                }
            }
            if has { Some(bounds) } else { None }
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

    impl DrawingSink for Document {
        /// 已存在的图层只更新颜色。
        fn add_layer(&mut self, name: &str, color: i16) {
            match self.layers.iter_mut().find(|layer| layer.name == name) {
                Some(layer) => layer.color = color,
                None => self.layers.push(Layer::with_color(name, color)),
            }
        }

        /// 同名样式已登记时保持原字体。
        fn add_text_style(&mut self, name: &str, font: &str) {
            if self.text_style(name).is_none() {
                self.text_styles.push(TextStyle {
                    name: name.to_string(),
                    font: font.to_string(),
                });
            }
        }

        fn add_polyline(&mut self, points: &[Point2], is_closed: bool, layer: &str) -> EntityId {
            self.add_entity(Entity::Polyline(Polyline {
                vertices: points.to_vec(),
                is_closed,
                layer: layer.to_string(),
            }))
        }

        fn add_text(
            &mut self,
            content: &str,
            insert: Point2,
            rotation: f64,
            height: f64,
            layer: &str,
            style: &str,
        ) -> EntityId {
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.to_string(),
                height,
                rotation,
                layer: layer.to_string(),
                style: style.to_string(),
            }))
        }
    }

}
