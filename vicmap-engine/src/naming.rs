//! 输出文件命名。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::request::{DrawingScale, RequestError};
use crate::scale::CoordinateBasis;

static ILLEGAL_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("文件名字符集正则无效"));

/// 把文件名非法字符替换为 `_`；清理后只剩 `_` 或空白时返回 `None`。
pub fn sanitize_project_name(name: &str) -> Option<String> {
    let cleaned = ILLEGAL_FILE_CHARS.replace_all(name.trim(), "_").into_owned();
    if cleaned.chars().all(|ch| ch == '_' || ch.is_whitespace()) {
        None
    } else {
        Some(cleaned)
    }
}

/// 单词首字母大写、其余小写，非字母字符视为单词分隔。
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(ch);
            previous_is_letter = false;
        }
    }
    out
}

/// `{项目}[_{县}]_VicinityMap_1in{比例}ft_{N83G|N83S}.dxf`
pub fn output_file_name(
    project_name: &str,
    county: Option<&str>,
    scale: DrawingScale,
    basis: CoordinateBasis,
) -> Result<String, RequestError> {
    let project = sanitize_project_name(project_name).ok_or(RequestError::EmptyProjectName)?;
    let county = county
        .map(str::trim)
        .filter(|county| !county.is_empty())
        .and_then(sanitize_project_name)
        .map(|county| format!("_{}", title_case(&county)))
        .unwrap_or_default();
    Ok(format!(
        "{project}{county}_VicinityMap_1in{}ft_{}.dxf",
        scale.feet_per_inch(),
        basis.suffix()
    ))
}
