use std::borrow::Cow;

use encoding_rs::WINDOWS_1252;
use vicmap_core::document::{
    DEFAULT_LAYER, DEFAULT_TEXT_STYLE, Document, DrawingSink, Entity, Polyline, Text,
};
use vicmap_core::geometry::Point2;

use crate::writer::CODEPAGE;

/// POLYLINE 标志位：闭合、多边形网格、多面网格。
const FLAG_CLOSED: i32 = 0x01;
const FLAG_MESH: i32 = 0x10 | 0x40;

#[derive(Debug)]
pub(crate) enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// 读取本工具写出的 DXF 子集：LAYER/STYLE 表，POLYLINE/VERTEX 与 TEXT 实体。
/// 其余段落跳过，其余实体报告为不支持。
pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();
        loop {
            let Some((code, marker)) = self.reader.next_pair()? else {
                return Err(DxfError::invalid("文件缺少 EOF 标记"));
            };
            match (code, marker.as_str()) {
                (0, "EOF") => return Ok(document),
                (0, "SECTION") => {
                    let header = self.reader.read_record("SECTION")?;
                    match header.text(2) {
                        Some("TABLES") => self.read_tables(&mut document)?,
                        Some("ENTITIES") => self.read_entities(&mut document)?,
                        Some(_) => self.skip_to_endsec()?,
                        None => return Err(DxfError::invalid("SECTION 缺少名称（组码 2）")),
                    }
                }
                (0, other) => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {other}，期望 SECTION 或 EOF"
                    )));
                }
                (other, _) => {
                    return Err(DxfError::invalid(format!(
                        "段落之间出现组码 {other}（期望 0）"
                    )));
                }
            }
        }
    }

    fn skip_to_endsec(&mut self) -> Result<(), DxfError> {
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 0 && value == "ENDSEC" {
                return Ok(());
            }
        }
        Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"))
    }

    fn read_tables(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let kind = self.reader.next_marker("TABLES")?;
            let record = self.reader.read_record(&kind)?;
            match kind.as_str() {
                "ENDSEC" => return Ok(()),
                "LAYER" => {
                    if let Some(name) = record.text(2) {
                        // 负色号表示图层关闭，读回时按可见处理
                        let color = record.int(62, "LAYER 颜色")?.unwrap_or(7);
                        document.add_layer(name, clamp_color(color)?.abs());
                    }
                }
                "STYLE" => {
                    if let Some(name) = record.text(2) {
                        document.add_text_style(name, record.text(3).unwrap_or_default());
                    }
                }
                _ => {}
            }
        }
    }

    fn read_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let kind = self.reader.next_marker("ENTITIES")?;
            let entity = match kind.as_str() {
                "ENDSEC" => {
                    self.reader.read_record("ENDSEC")?;
                    return Ok(());
                }
                "POLYLINE" => self.polyline()?,
                "TEXT" => text(&self.reader.read_record("TEXT")?)?,
                other => {
                    return Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}")));
                }
            };
            document.add_entity(entity);
        }
    }

    /// 旧式 POLYLINE：头记录之后跟随 VERTEX 记录，以 SEQEND 结束。
    fn polyline(&mut self) -> Result<Entity, DxfError> {
        let header = self.reader.read_record("POLYLINE")?;
        let flags = header.int(70, "POLYLINE 标志")?.unwrap_or(0);
        if flags & FLAG_MESH != 0 {
            return Err(DxfError::unsupported("POLYLINE 网格/多面网格"));
        }

        let mut vertices = Vec::new();
        loop {
            let kind = self.reader.next_marker("POLYLINE")?;
            let record = self.reader.read_record(&kind)?;
            match kind.as_str() {
                "VERTEX" => vertices.push(Point2::new(
                    record.required_real(10, "VERTEX X")?,
                    record.required_real(20, "VERTEX Y")?,
                )),
                "SEQEND" => break,
                other => {
                    return Err(DxfError::invalid(format!(
                        "POLYLINE 顶点序列中遇到 {other}，缺少 SEQEND"
                    )));
                }
            }
        }
        if vertices.is_empty() {
            return Err(DxfError::invalid("POLYLINE 未解析到任何顶点"));
        }
        Ok(Entity::Polyline(Polyline {
            vertices,
            is_closed: flags & FLAG_CLOSED != 0,
            layer: header.layer(),
        }))
    }
}

fn text(record: &Record) -> Result<Entity, DxfError> {
    let content = record
        .raw(1)
        .ok_or_else(|| DxfError::invalid("TEXT 缺少文本内容（组码 1）"))?;
    Ok(Entity::Text(Text {
        insert: Point2::new(
            record.required_real(10, "TEXT 插入点 X")?,
            record.required_real(20, "TEXT 插入点 Y")?,
        ),
        content: unescape_unicode(content),
        height: record.required_real(40, "TEXT 高度")?,
        rotation: record.real(50, "TEXT 旋转角")?.unwrap_or(0.0),
        layer: record.layer(),
        style: record.text(7).unwrap_or(DEFAULT_TEXT_STYLE).to_string(),
    }))
}

/// 还原写出时对代码页之外字符使用的 `\U+XXXX` 转义。
fn unescape_unicode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(index) = rest.find("\\U+") {
        out.push_str(&rest[..index]);
        let digits = rest.get(index + 3..index + 7);
        match digits
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32)
        {
            Some(ch) => {
                out.push(ch);
                rest = &rest[index + 7..];
            }
            None => {
                out.push_str("\\U+");
                rest = &rest[index + 3..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// 按 `$DWGCODEPAGE` 解码文件内容；声明为 ANSI_1252 或不是合法 UTF-8 时按
/// Windows-1252 解码。
pub(crate) fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) if declared_codepage(text) != Some(CODEPAGE) => Cow::Borrowed(text),
        _ => WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

fn declared_codepage(text: &str) -> Option<&str> {
    let mut lines = text.lines().map(str::trim);
    lines.find(|line| *line == "$DWGCODEPAGE")?;
    lines.nth(1)
}

fn clamp_color(value: i32) -> Result<i16, DxfError> {
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("LAYER 颜色超出 i16 范围（值：{value}）")))
}

/// 一个实体或表记录在下一个 0 组码之前的全部组码对。
#[derive(Debug, Default)]
struct Record {
    pairs: Vec<(i32, String)>,
}

impl Record {
    fn raw(&self, code: i32) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, value)| value.as_str())
    }

    fn text(&self, code: i32) -> Option<&str> {
        self.raw(code).map(str::trim)
    }

    fn real(&self, code: i32, context: &str) -> Result<Option<f64>, DxfError> {
        self.raw(code).map(|value| parse_f64(value, context)).transpose()
    }

    fn required_real(&self, code: i32, context: &str) -> Result<f64, DxfError> {
        self.real(code, context)?
            .ok_or_else(|| DxfError::invalid(format!("{context} 缺失（组码 {code}）")))
    }

    fn int(&self, code: i32, context: &str) -> Result<Option<i32>, DxfError> {
        self.raw(code)
            .map(|value| {
                value.trim().parse::<i32>().map_err(|_| {
                    DxfError::invalid(format!("{context} 解析失败（值：\"{value}\"）"))
                })
            })
            .transpose()
    }

    fn layer(&self) -> String {
        self.text(8).unwrap_or(DEFAULT_LAYER).to_string()
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    pending: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            pending: None,
            line_number: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(line)
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.pending.take() {
            return Ok(Some(pair));
        }
        let Some(code_line) = self.next_line() else {
            return Ok(None);
        };
        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 不是整数",
                self.line_number,
                code_line.trim()
            ))
        })?;
        let value = self.next_line().ok_or_else(|| {
            DxfError::invalid(format!("组码 {code} 之后文件提前结束（第 {} 行）", self.line_number))
        })?;
        Ok(Some((code, value.trim_end_matches('\r').to_string())))
    }

    /// 读取下一个 0 组码的值，即下一条记录的类型。
    fn next_marker(&mut self, section: &str) -> Result<String, DxfError> {
        match self.next_pair()? {
            Some((0, value)) => Ok(value),
            Some((code, _)) => Err(DxfError::invalid(format!(
                "{section} 段遇到组码 {code}（期望 0 表示记录起始）"
            ))),
            None => Err(DxfError::invalid(format!("{section} 段提前结束"))),
        }
    }

    /// 收集组码对直到下一个 0 组码（保留给下次读取）。
    fn read_record(&mut self, owner: &str) -> Result<Record, DxfError> {
        let mut record = Record::default();
        loop {
            match self.next_pair()? {
                Some((0, value)) => {
                    self.pending = Some((0, value));
                    return Ok(record);
                }
                Some(pair) => record.pairs.push(pair),
                None => return Err(DxfError::invalid(format!("{owner} 未正确结束"))),
            }
        }
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}
