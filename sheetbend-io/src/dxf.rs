//! DXF 折弯件交换格式：读取外轮廓顶点与折弯线，并把编辑结果回写到源文件的副本。
//!
//! 文件按“组码行 + 值行”成对组织。[`GroupTokenizer`] 负责配对，读写两端都只消费配对后的
//! 结果；无法配对的结构错误（组码不是整数、组码行后缺少值行）直接报错，数值字段解析失败
//! 则按 0 处理并记录警告。

use std::path::{Path, PathBuf};

use sheetbend_core::geometry::{BendLine, Point2};
use tracing::{debug, info, warn};

use crate::output::{
    RawLines, contour_order, detect_newline, line_terminator, read_source, sibling_output_path,
    write_atomically,
};
use crate::{ExportOptions, IoError};

const XDATA_APP_CODE: i32 = 1001;

/// 一组“组码 + 值”。`raw` 保留两行原始字节（含换行），便于原样回写。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPair<'a> {
    pub code: i32,
    pub value: &'a str,
    pub code_raw: &'a str,
    pub value_raw: &'a str,
    pub raw: &'a str,
    pub line: usize,
}

impl GroupPair<'_> {
    #[inline]
    fn is_entity(&self, name: &str) -> bool {
        self.code == 0 && self.value == name
    }
}

/// 将 DXF 文本惰性地切分为组码对。
pub struct GroupTokenizer<'a> {
    lines: RawLines<'a>,
    failed: bool,
}

impl<'a> GroupTokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: RawLines::new(source),
            failed: false,
        }
    }

    fn next_pair(&mut self) -> Result<Option<GroupPair<'a>>, IoError> {
        let start = self.lines.offset();
        let Some(code_raw) = self.lines.next() else {
            return Ok(None);
        };
        let line = self.lines.line_number();
        let code_text = code_raw.trim();
        if code_text.is_empty() && self.lines.rest().trim().is_empty() {
            // 文件末尾的空行
            return Ok(None);
        }
        let code = code_text.parse::<i32>().map_err(|_| {
            IoError::malformed(line, format!("组码 \"{code_text}\" 无法解析为整数"))
        })?;
        let value_raw = self.lines.next().ok_or_else(|| {
            IoError::malformed(line, format!("组码 {code} 之后缺少值行"))
        })?;
        Ok(Some(GroupPair {
            code,
            value: value_raw.trim(),
            code_raw,
            value_raw,
            raw: self.lines.slice_from(start),
            line,
        }))
    }
}

impl<'a> Iterator for GroupTokenizer<'a> {
    type Item = Result<GroupPair<'a>, IoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_pair() {
            Ok(pair) => pair.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// DXF 读取结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DxfPart {
    pub vertices: Vec<Point2>,
    pub bends: Vec<BendLine>,
    pub thickness: f64,
    pub closed: bool,
}

pub struct DxfReader {
    path: PathBuf,
}

impl DxfReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read(&self) -> Result<DxfPart, IoError> {
        let source = read_source(&self.path)?;
        let part = parse(&source)?;
        info!(
            path = %self.path.display(),
            vertices = part.vertices.len(),
            bends = part.bends.len(),
            closed = part.closed,
            "已读取 DXF"
        );
        Ok(part)
    }
}

/// 直接解析内存中的 DXF 文本。
pub fn parse(source: &str) -> Result<DxfPart, IoError> {
    let mut machine = DxfMachine::default();
    for pair in GroupTokenizer::new(source) {
        machine.step(&pair?);
    }
    machine.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DxfState {
    #[default]
    Initial,
    Polyline,
    Vertex,
    BendLine,
    BendParameter,
}

#[derive(Debug, Default, Clone, Copy)]
struct PartialPoint {
    x: Option<f64>,
    y: Option<f64>,
}

impl PartialPoint {
    fn complete(&self) -> Option<Point2> {
        Some(Point2::new(self.x?, self.y?))
    }
}

/// 折弯属性在多条折弯线之间保留最近一次出现的值。
#[derive(Debug, Default, Clone, Copy)]
struct BendAttributes {
    angle: f64,
    thickness: f64,
    radius: f64,
    k_factor: f64,
    bend_factor: f64,
}

#[derive(Debug, Default)]
struct DxfMachine {
    state: DxfState,
    part: DxfPart,
    vertex: PartialPoint,
    bend_start: PartialPoint,
    bend_end: PartialPoint,
    attributes: BendAttributes,
}

impl DxfMachine {
    fn step(&mut self, pair: &GroupPair<'_>) {
        if pair.code == 0 {
            self.enter_entity(pair);
            return;
        }
        match (self.state, pair.code) {
            (DxfState::Polyline, 70) => {
                let flags = lenient_i32(pair, "POLYLINE 标志（组码 70）");
                self.part.closed = flags & 1 == 1;
            }
            (DxfState::Vertex, 10) => {
                self.vertex.x = Some(lenient_f64(pair, "VERTEX X"));
                self.flush_vertex();
            }
            (DxfState::Vertex, 20) => {
                self.vertex.y = Some(lenient_f64(pair, "VERTEX Y"));
                self.flush_vertex();
            }
            (DxfState::BendLine, 10) => self.bend_start.x = Some(lenient_f64(pair, "LINE 起点 X")),
            (DxfState::BendLine, 20) => self.bend_start.y = Some(lenient_f64(pair, "LINE 起点 Y")),
            (DxfState::BendLine, 11) => self.bend_end.x = Some(lenient_f64(pair, "LINE 终点 X")),
            (DxfState::BendLine, 21) => self.bend_end.y = Some(lenient_f64(pair, "LINE 终点 Y")),
            (DxfState::BendLine, XDATA_APP_CODE) => {
                debug!(line = pair.line, app = pair.value, "进入折弯参数");
                self.state = DxfState::BendParameter;
            }
            (DxfState::BendParameter, _) => self.apply_attribute(pair),
            _ => {}
        }
    }

    fn enter_entity(&mut self, pair: &GroupPair<'_>) {
        let next = match (self.state, pair.value) {
            (DxfState::Polyline | DxfState::Vertex, "VERTEX") => {
                self.vertex = PartialPoint::default();
                DxfState::Vertex
            }
            (DxfState::Polyline | DxfState::Vertex, "SEQEND") => DxfState::Initial,
            (_, "POLYLINE") => {
                self.part.closed = false;
                DxfState::Polyline
            }
            (_, "LINE") => DxfState::BendLine,
            _ => DxfState::Initial,
        };
        if matches!(self.state, DxfState::BendLine | DxfState::BendParameter) {
            debug!(line = pair.line, "LINE 未以 BUMP 结束，不作为折弯线");
        }
        if next == DxfState::BendLine {
            self.bend_start = PartialPoint::default();
            self.bend_end = PartialPoint::default();
        }
        if next != self.state {
            debug!(line = pair.line, from = ?self.state, to = ?next, "DXF 状态切换");
        }
        self.state = next;
    }

    fn flush_vertex(&mut self) {
        if let Some(point) = self.vertex.complete() {
            self.part.vertices.push(point);
            self.vertex = PartialPoint::default();
        }
    }

    fn apply_attribute(&mut self, pair: &GroupPair<'_>) {
        if pair.value.starts_with("BUMP") {
            self.emit_bend(pair.line);
            return;
        }
        let Some((key, raw)) = pair.value.split_once(':') else {
            return;
        };
        let slot = match key.trim() {
            "BEND_ANGLE" => &mut self.attributes.angle,
            "THICKNESS" => &mut self.attributes.thickness,
            "BEND_RADIUS" => &mut self.attributes.radius,
            "K_FACTOR" => &mut self.attributes.k_factor,
            "BEND_FACTOR" => &mut self.attributes.bend_factor,
            _ => return,
        };
        *slot = raw.trim().parse::<f64>().unwrap_or_else(|_| {
            warn!(line = pair.line, key = key.trim(), value = raw.trim(), "折弯属性解析失败，按 0 处理");
            0.0
        });
        if key.trim() == "THICKNESS" {
            self.part.thickness = self.attributes.thickness;
        }
    }

    fn emit_bend(&mut self, line: usize) {
        match (self.bend_start.complete(), self.bend_end.complete()) {
            (Some(start), Some(end)) => {
                let attrs = self.attributes;
                debug!(line, k_factor = attrs.k_factor, "折弯线结束");
                self.part.bends.push(BendLine::new(
                    start,
                    end,
                    attrs.bend_factor,
                    attrs.radius,
                    attrs.angle,
                ));
            }
            _ => warn!(line, "折弯线缺少端点坐标，已忽略"),
        }
        self.state = DxfState::Initial;
    }

    fn finish(self) -> Result<DxfPart, IoError> {
        if matches!(self.state, DxfState::BendParameter) {
            debug!("文件结束时折弯参数未以 BUMP 结束");
        }
        Ok(self.part)
    }
}

fn lenient_f64(pair: &GroupPair<'_>, context: &str) -> f64 {
    pair.value.parse::<f64>().unwrap_or_else(|_| {
        warn!(line = pair.line + 1, context, value = pair.value, "数值解析失败，按 0 处理");
        0.0
    })
}

fn lenient_i32(pair: &GroupPair<'_>, context: &str) -> i32 {
    pair.value.parse::<i32>().unwrap_or_else(|_| {
        warn!(line = pair.line + 1, context, value = pair.value, "整数解析失败，按 0 处理");
        0
    })
}

/// 将编辑后的顶点与折弯线写回 DXF 副本。
pub struct DxfWriter {
    path: PathBuf,
    options: ExportOptions,
}

impl DxfWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// 读取源文件，替换顶点块与折弯线坐标后写入 `modified_` 副本，返回副本路径。
    pub fn overwrite(&self, points: &[Point2], bends: &[BendLine]) -> Result<PathBuf, IoError> {
        let source = read_source(&self.path)?;
        let patched = patch(&source, points, bends)?;
        let target = sibling_output_path(&self.path, &self.options.output_prefix)?;
        write_atomically(&target, &patched)?;
        info!(
            source = %self.path.display(),
            target = %target.display(),
            points = points.len(),
            bends = bends.len(),
            "已写出 DXF"
        );
        Ok(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchMode {
    Copy,
    SkipVertices,
}

/// 在内存中生成回写内容。顶点去重后，超过两个点时按逆时针排序。
///
/// LINE 实体先整体缓存到下一个组码 0，再按读取端的规则判定是否为折弯线，
/// 只有折弯线才会依次替换扩展数据之前的 10/20/11/21。
pub fn patch(source: &str, points: &[Point2], bends: &[BendLine]) -> Result<String, IoError> {
    let newline = detect_newline(source);
    let points = contour_order(points);
    let mut out = String::with_capacity(source.len() + points.len() * 48);
    let mut mode = PatchMode::Copy;
    let mut vertex_layer: Option<String> = None;
    let mut line_entity: Vec<GroupPair<'_>> = Vec::new();
    let mut bend_index = 0;
    let mut last_line = 0;

    for pair in GroupTokenizer::new(source) {
        let pair = pair?;
        last_line = pair.line;

        if !line_entity.is_empty() {
            if pair.code != 0 {
                line_entity.push(pair);
                continue;
            }
            if write_line_entity(&mut out, &line_entity, bends.get(bend_index)) {
                bend_index += 1;
            }
            line_entity.clear();
        }

        match mode {
            PatchMode::SkipVertices => {
                if pair.code == 8 && vertex_layer.is_none() {
                    vertex_layer = Some(pair.value.to_string());
                }
                if pair.is_entity("SEQEND") {
                    let layer = vertex_layer.take().unwrap_or_else(|| "0".to_string());
                    write_vertices(&mut out, &points, &layer, newline);
                    out.push_str(pair.raw);
                    mode = PatchMode::Copy;
                }
            }
            PatchMode::Copy if pair.is_entity("VERTEX") => {
                mode = PatchMode::SkipVertices;
            }
            PatchMode::Copy if pair.is_entity("LINE") => line_entity.push(pair),
            PatchMode::Copy => out.push_str(pair.raw),
        }
    }

    if !line_entity.is_empty() && write_line_entity(&mut out, &line_entity, bends.get(bend_index))
    {
        bend_index += 1;
    }
    if mode == PatchMode::SkipVertices {
        return Err(IoError::malformed(last_line, "VERTEX 块缺少 SEQEND"));
    }
    if bend_index < bends.len() {
        debug!(
            written = bend_index,
            supplied = bends.len(),
            "文件中的折弯线少于当前折弯线数量"
        );
    }
    Ok(out)
}

/// 读取端是否会把这一段 LINE 实体识别为折弯线。
fn is_bend_entity(pairs: &[GroupPair<'_>]) -> bool {
    let mut machine = DxfMachine::default();
    for pair in pairs {
        machine.step(pair);
    }
    !machine.part.bends.is_empty()
}

/// 写出缓存的 LINE 实体，返回它是否为折弯线。
fn write_line_entity(out: &mut String, pairs: &[GroupPair<'_>], bend: Option<&BendLine>) -> bool {
    let is_bend = is_bend_entity(pairs);
    let mut in_xdata = false;
    for pair in pairs {
        in_xdata |= pair.code == XDATA_APP_CODE;
        let substitute = bend
            .filter(|_| is_bend && !in_xdata)
            .and_then(|bend| match pair.code {
                10 => Some(bend.start().x()),
                20 => Some(bend.start().y()),
                11 => Some(bend.end().x()),
                21 => Some(bend.end().y()),
                _ => None,
            });
        match substitute {
            Some(value) => {
                out.push_str(pair.code_raw);
                out.push_str(&value.to_string());
                out.push_str(line_terminator(pair.value_raw));
            }
            None => out.push_str(pair.raw),
        }
    }
    is_bend
}

fn write_vertices(out: &mut String, points: &[Point2], layer: &str, newline: &str) {
    for point in points {
        for (code, value) in [
            ("  0", "VERTEX".to_string()),
            ("  8", layer.to_string()),
            (" 10", point.x().to_string()),
            (" 20", point.y().to_string()),
        ] {
            out.push_str(code);
            out.push_str(newline);
            out.push_str(&value);
            out.push_str(newline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEND_PART: &str = "  0\nSECTION\n  2\nENTITIES\n  0\nPOLYLINE\n  8\nOUTLINE\n 70\n1\n  0\nVERTEX\n  8\nOUTLINE\n 10\n0.0\n 20\n0.0\n  0\nVERTEX\n  8\nOUTLINE\n 10\n100\n 20\n0\n  0\nVERTEX\n  8\nOUTLINE\n 10\n100\n 20\n50\n  0\nSEQEND\n  0\nLINE\n  8\nBend\n 10\n40\n 20\n0\n 11\n40\n 21\n50\n1001\nSHEETMETAL\n1000\nBEND_ANGLE: 90\n1000\nTHICKNESS: 2\n1000\nBEND_RADIUS: 1.5\n1000\nK_FACTOR: 0.33\n1000\nBEND_FACTOR: 3.25\n1000\nBUMP: 0\n  0\nENDSEC\n  0\nEOF\n";

    #[test]
    fn tokenizer_pairs_codes_with_values() {
        let pairs: Vec<_> = GroupTokenizer::new("  0\r\nSECTION\r\n  2\r\nENTITIES\r\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].code, 0);
        assert_eq!(pairs[0].value, "SECTION");
        assert_eq!(pairs[0].raw, "  0\r\nSECTION\r\n");
        assert_eq!(pairs[1].line, 3);
    }

    #[test]
    fn tokenizer_rejects_structural_errors() {
        let mut dangling = GroupTokenizer::new("  0\nEOF\n 10\n");
        assert!(dangling.next().unwrap().is_ok());
        let err = dangling.next().unwrap().unwrap_err();
        assert!(matches!(err, IoError::Malformed { line: 3, .. }));
        assert!(dangling.next().is_none());

        let mut bad_code = GroupTokenizer::new("abc\nvalue\n");
        assert!(matches!(
            bad_code.next(),
            Some(Err(IoError::Malformed { line: 1, .. }))
        ));
    }

    #[test]
    fn tokenizer_ignores_trailing_blank_lines() {
        let pairs: Vec<_> = GroupTokenizer::new("  0\nEOF\n\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn parse_extracts_vertices_and_bend() {
        let part = parse(BEND_PART).unwrap();
        assert_eq!(
            part.vertices,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(100.0, 0.0),
                Point2::new(100.0, 50.0),
            ]
        );
        assert!(part.closed);
        assert_eq!(part.thickness, 2.0);
        assert_eq!(part.bends.len(), 1);
        let bend = part.bends[0];
        assert_eq!(bend.start(), Point2::new(40.0, 0.0));
        assert_eq!(bend.end(), Point2::new(40.0, 50.0));
        assert_eq!(bend.angle, 90.0);
        assert_eq!(bend.radius, 1.5);
        assert_eq!(bend.deduction, 3.25);
    }

    #[test]
    fn malformed_numbers_become_zero() {
        let source = "  0\nPOLYLINE\n 70\nx\n  0\nVERTEX\n 10\nabc\n 20\n5\n  0\nSEQEND\n";
        let part = parse(source).unwrap();
        assert!(!part.closed);
        assert_eq!(part.vertices, vec![Point2::new(0.0, 5.0)]);
    }

    #[test]
    fn plain_line_without_bump_is_not_a_bend() {
        let source = "  0\nLINE\n  8\n0\n 10\n1\n 20\n1\n 11\n2\n 21\n2\n  0\nEOF\n";
        let part = parse(source).unwrap();
        assert!(part.bends.is_empty());
    }

    #[test]
    fn patch_replaces_vertices_and_bend_coordinates() {
        let points = [
            Point2::new(0.0, 60.0),
            Point2::new(0.0, 0.0),
            Point2::new(120.0, 0.0),
            Point2::new(120.0, 60.0),
        ];
        let bends = [BendLine::new(
            Point2::new(45.5, 0.0),
            Point2::new(45.5, 60.0),
            3.25,
            1.5,
            90.0,
        )];
        let patched = patch(BEND_PART, &points, &bends).unwrap();
        assert!(patched.contains(" 10\n45.5\n 20\n0\n 11\n45.5\n 21\n60\n1001\nSHEETMETAL\n"));
        assert!(patched.contains("  0\nVERTEX\n  8\nOUTLINE\n 10\n0\n 20\n0\n"));
        assert!(patched.ends_with("1000\nBUMP: 0\n  0\nENDSEC\n  0\nEOF\n"));

        let reread = parse(&patched).unwrap();
        assert_eq!(
            reread.vertices,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(120.0, 0.0),
                Point2::new(120.0, 60.0),
                Point2::new(0.0, 60.0),
            ]
        );
        assert_eq!(reread.bends[0].end(), Point2::new(45.5, 60.0));
        assert!(reread.closed);
    }

    #[test]
    fn patch_leaves_plain_lines_on_bend_layer_alone() {
        let source = "  0\nLINE\n  8\nBend\n 10\n10\n 20\n0\n 11\n10\n 21\n50\n  0\nLINE\n  8\nBend\n 10\n40\n 20\n0\n 11\n40\n 21\n50\n1001\nSHEETMETAL\n1000\nBUMP: 0\n  0\nEOF\n";
        let bends = [BendLine::new(
            Point2::new(45.0, 0.0),
            Point2::new(45.0, 50.0),
            0.0,
            0.0,
            0.0,
        )];
        let patched = patch(source, &[], &bends).unwrap();
        assert!(patched.starts_with(
            "  0\nLINE\n  8\nBend\n 10\n10\n 20\n0\n 11\n10\n 21\n50\n  0\nLINE\n"
        ));

        let reread = parse(&patched).unwrap();
        assert_eq!(reread.bends.len(), 1);
        assert_eq!(reread.bends[0].start(), Point2::new(45.0, 0.0));
        assert_eq!(reread.bends[0].end(), Point2::new(45.0, 50.0));
    }

    #[test]
    fn patch_rewrites_bends_on_any_layer() {
        let source = "  0\nLINE\n  8\nBEND_LINES\n 10\n40\n 20\n0\n 11\n40\n 21\n50\n1001\nSHEETMETAL\n1000\nBUMP: 0\n";
        let bends = [BendLine::new(
            Point2::new(45.0, 0.0),
            Point2::new(45.0, 50.0),
            0.0,
            0.0,
            0.0,
        )];
        let patched = patch(source, &[], &bends).unwrap();
        assert!(patched.ends_with("1001\nSHEETMETAL\n1000\nBUMP: 0\n"));

        let reread = parse(&patched).unwrap();
        assert_eq!(reread.bends.len(), 1);
        assert_eq!(reread.bends[0].start(), Point2::new(45.0, 0.0));
        assert_eq!(reread.bends[0].end(), Point2::new(45.0, 50.0));
    }

    #[test]
    fn patch_fails_on_unterminated_vertex_block() {
        let source = "  0\nPOLYLINE\n  0\nVERTEX\n 10\n1\n 20\n1\n";
        let err = patch(source, &[Point2::new(0.0, 0.0)], &[]).unwrap_err();
        assert!(matches!(err, IoError::Malformed { .. }));
    }
}
