use std::io::{self, Write};

use encoding_rs::WINDOWS_1252;
use vicmap_core::document::{Document, Entity, Polyline, Text};
use vicmap_core::geometry::Point2;

const CONTINUOUS: &str = "CONTINUOUS";
/// R12 没有 UTF-8 文件，文本按该代码页编码。
pub(crate) const CODEPAGE: &str = "ANSI_1252";

/// 按组码/值成对写出。
struct DxfWriter<'a, W: Write> {
    out: &'a mut W,
}

impl<'a, W: Write> DxfWriter<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self { out }
    }

    fn pair(&mut self, code: i32, value: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{code:>3}")?;
        writeln!(self.out, "{value}")
    }

    fn point(&mut self, base_code: i32, point: Point2) -> io::Result<()> {
        self.pair(base_code, point.x())?;
        self.pair(base_code + 10, point.y())?;
        self.pair(base_code + 20, 0.0)
    }

    fn begin_section(&mut self, name: &str) -> io::Result<()> {
        self.pair(0, "SECTION")?;
        self.pair(2, name)
    }

    fn end_section(&mut self) -> io::Result<()> {
        self.pair(0, "ENDSEC")
    }

    fn begin_table(&mut self, name: &str, count: usize) -> io::Result<()> {
        self.pair(0, "TABLE")?;
        self.pair(2, name)?;
        self.pair(70, count)
    }

    fn end_table(&mut self) -> io::Result<()> {
        self.pair(0, "ENDTAB")
    }
}

/// 生成最终写盘的字节：代码页之外的字符转义为 `\U+XXXX`，其余按 Windows-1252 编码。
pub(crate) fn encode_document(document: &Document) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_document(document, &mut buffer)?;
    let text =
        String::from_utf8(buffer).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let escaped = escape_for_codepage(&text);
    let (bytes, _, _) = WINDOWS_1252.encode(&escaped);
    Ok(bytes.into_owned())
}

fn escape_for_codepage(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut scratch = [0u8; 4];
    for ch in text.chars() {
        let unmappable = !ch.is_ascii() && WINDOWS_1252.encode(ch.encode_utf8(&mut scratch)).2;
        if !unmappable {
            escaped.push(ch);
        } else if u32::from(ch) > 0xFFFF {
            escaped.push('?');
        } else {
            escaped.push_str(&format!("\\U+{:04X}", u32::from(ch)));
        }
    }
    escaped
}

fn write_document<W: Write>(document: &Document, out: &mut W) -> io::Result<()> {
    let mut writer = DxfWriter::new(out);
    write_header(document, &mut writer)?;
    write_tables(document, &mut writer)?;

    writer.begin_section("BLOCKS")?;
    writer.end_section()?;

    writer.begin_section("ENTITIES")?;
    for (_, entity) in document.entities() {
        match entity {
            Entity::Polyline(polyline) => write_polyline(polyline, &mut writer)?,
            Entity::Text(text) => write_text(text, &mut writer)?,
        }
    }
    writer.end_section()?;
    writer.pair(0, "EOF")
}

fn write_header<W: Write>(document: &Document, writer: &mut DxfWriter<'_, W>) -> io::Result<()> {
    writer.begin_section("HEADER")?;
    writer.pair(9, "$ACADVER")?;
    writer.pair(1, "AC1009")?;
    writer.pair(9, "$DWGCODEPAGE")?;
    writer.pair(3, CODEPAGE)?;
    if let Some(bounds) = document.bounds() {
        writer.pair(9, "$EXTMIN")?;
        writer.point(10, bounds.min())?;
        writer.pair(9, "$EXTMAX")?;
        writer.point(10, bounds.max())?;
    }
    writer.end_section()
}

fn write_tables<W: Write>(document: &Document, writer: &mut DxfWriter<'_, W>) -> io::Result<()> {
    writer.begin_section("TABLES")?;

    writer.begin_table("LTYPE", 1)?;
    writer.pair(0, "LTYPE")?;
    writer.pair(2, CONTINUOUS)?;
    writer.pair(70, 0)?;
    writer.pair(3, "Solid line")?;
    writer.pair(72, 65)?;
    writer.pair(73, 0)?;
    writer.pair(40, 0.0)?;
    writer.end_table()?;

    writer.begin_table("LAYER", document.layers().count())?;
    for layer in document.layers() {
        writer.pair(0, "LAYER")?;
        writer.pair(2, &layer.name)?;
        writer.pair(70, 0)?;
        // 负颜色号表示图层关闭
        let color = if layer.is_visible {
            layer.color.abs()
        } else {
            -layer.color.abs()
        };
        writer.pair(62, color)?;
        writer.pair(6, CONTINUOUS)?;
    }
    writer.end_table()?;

    writer.begin_table("STYLE", document.text_styles().count())?;
    for style in document.text_styles() {
        writer.pair(0, "STYLE")?;
        writer.pair(2, &style.name)?;
        writer.pair(70, 0)?;
        writer.pair(40, 0.0)?;
        writer.pair(41, 1.0)?;
        writer.pair(50, 0.0)?;
        writer.pair(71, 0)?;
        writer.pair(42, 2.5)?;
        writer.pair(3, &style.font)?;
        writer.pair(4, "")?;
    }
    writer.end_table()?;

    writer.end_section()
}

fn write_polyline<W: Write>(polyline: &Polyline, writer: &mut DxfWriter<'_, W>) -> io::Result<()> {
    writer.pair(0, "POLYLINE")?;
    writer.pair(8, &polyline.layer)?;
    writer.pair(66, 1)?;
    writer.point(10, Point2::new(0.0, 0.0))?;
    writer.pair(70, if polyline.is_closed { 1 } else { 0 })?;
    for vertex in &polyline.vertices {
        writer.pair(0, "VERTEX")?;
        writer.pair(8, &polyline.layer)?;
        writer.point(10, *vertex)?;
    }
    writer.pair(0, "SEQEND")?;
    writer.pair(8, &polyline.layer)
}

fn write_text<W: Write>(text: &Text, writer: &mut DxfWriter<'_, W>) -> io::Result<()> {
    writer.pair(0, "TEXT")?;
    writer.pair(8, &text.layer)?;
    writer.point(10, text.insert)?;
    writer.pair(40, text.height)?;
    writer.pair(1, sanitize_text(&text.content))?;
    writer.pair(50, text.rotation)?;
    writer.pair(7, &text.style)
}

/// TEXT 的组码 1 不允许换行。
fn sanitize_text(content: &str) -> String {
    content
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicmap_core::document::DrawingSink;

    #[test]
    fn writes_tables_and_entities_in_order() {
        let mut doc = Document::new();
        doc.add_layer("ROADS", 7);
        doc.add_text_style("ROMANS_STYLE", "romans.shx");
        doc.add_polyline(
            &[Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)],
            false,
            "ROADS",
        );
        doc.add_text(
            "Elm St\nNorth",
            Point2::new(5.0, 10.0),
            0.0,
            8.0,
            "ROAD_LABELS",
            "ROMANS_STYLE",
        );

        let mut buffer = Vec::new();
        write_document(&doc, &mut buffer).expect("write to memory");
        let dxf = String::from_utf8(buffer).expect("utf8");

        assert!(dxf.contains("AC1009"));
        assert!(dxf.contains("ROMANS_STYLE\n 70\n0"));
        assert!(dxf.contains("romans.shx"));
        assert!(dxf.contains("Elm St North"));
        assert_eq!(dxf.matches("\nVERTEX\n").count(), 2);
        let polyline_at = dxf.find("\nPOLYLINE\n").expect("polyline written");
        let text_at = dxf.find("\nTEXT\n").expect("text written");
        assert!(polyline_at < text_at);
        assert!(dxf.trim_end().ends_with("EOF"));
    }

    #[test]
    fn accented_names_use_the_ansi_codepage() {
        let mut doc = Document::new();
        doc.add_text_style("ARIAL_STYLE", "arial.ttf");
        doc.add_text(
            "Camino Peñasco / Łódź",
            Point2::new(0.0, 0.0),
            0.0,
            8.0,
            "ROAD_LABELS",
            "ARIAL_STYLE",
        );

        let bytes = encode_document(&doc).expect("encode");
        let header = String::from_utf8_lossy(&bytes);
        assert!(header.contains("$DWGCODEPAGE\n  3\nANSI_1252\n"));

        let expected: &[u8] = b"Camino Pe\xf1asco / \\U+0141\xf3d\\U+017A\n";
        assert!(
            bytes.windows(expected.len()).any(|window| window == expected),
            "label bytes not found"
        );
        assert!(!bytes.windows(2).any(|pair| pair == [0xc3, 0xb1]));
    }
}
