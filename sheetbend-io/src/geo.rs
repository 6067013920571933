//! GEO 折弯件格式：`#~<id>` 开始一个段，`##~~` 结束段，段内记录以 `|~` 结尾。
//!
//! 读取只关心四个段：`#~31` 点表、`#~331` 外轮廓、`#~37` 折弯参数、`#~371` 折弯线。
//! 其余段原样保留。

use std::path::{Path, PathBuf};

use sheetbend_core::geometry::{BendLine, Point2, dedup_exact};
use tracing::{debug, info, warn};

use crate::output::{
    RawLines, contour_order, detect_newline, read_source, sibling_output_path, write_atomically,
};
use crate::{ExportOptions, IoError};

const SECTION_POINTS: &str = "31";
const SECTION_LINES: &str = "331";
const SECTION_BEND_PARAMETER: &str = "37";
const SECTION_BEND_LINE: &str = "371";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoToken<'a> {
    SectionStart(&'a str),
    SectionEnd,
    RecordEnd,
    Text(&'a str),
}

/// 分类后的一行。`raw` 含行尾换行符。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoLine<'a> {
    pub token: GeoToken<'a>,
    pub raw: &'a str,
    pub line: usize,
}

pub struct GeoTokenizer<'a> {
    lines: RawLines<'a>,
}

impl<'a> GeoTokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: RawLines::new(source),
        }
    }
}

impl<'a> Iterator for GeoTokenizer<'a> {
    type Item = GeoLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.lines.next()?;
        let text = raw.trim();
        let token = if text == "##~~" {
            GeoToken::SectionEnd
        } else if text == "|~" {
            GeoToken::RecordEnd
        } else if let Some(id) = text.strip_prefix("#~") {
            GeoToken::SectionStart(id.trim())
        } else {
            GeoToken::Text(text)
        };
        Some(GeoLine {
            token,
            raw,
            line: self.lines.line_number(),
        })
    }
}

/// GEO 读取结果。轮廓始终视为闭合。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoPart {
    pub vertices: Vec<Point2>,
    pub bends: Vec<BendLine>,
}

pub struct GeoReader {
    path: PathBuf,
}

impl GeoReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read(&self) -> Result<GeoPart, IoError> {
        let source = read_source(&self.path)?;
        let part = parse(&source);
        info!(
            path = %self.path.display(),
            vertices = part.vertices.len(),
            bends = part.bends.len(),
            "已读取 GEO"
        );
        Ok(part)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GeoState {
    #[default]
    Initial,
    Points,
    Lines,
    BendParameter,
    BendLine,
}

impl GeoState {
    fn for_section(id: &str) -> Self {
        match id {
            SECTION_POINTS => GeoState::Points,
            SECTION_LINES => GeoState::Lines,
            SECTION_BEND_PARAMETER => GeoState::BendParameter,
            SECTION_BEND_LINE => GeoState::BendLine,
            _ => GeoState::Initial,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BendParameters {
    angle: f64,
    radius: f64,
    factor: f64,
}

#[derive(Debug, Default)]
struct GeoMachine<'a> {
    state: GeoState,
    record: Vec<&'a str>,
    record_line: usize,
    table: Vec<Point2>,
    vertices: Vec<Point2>,
    bends: Vec<BendLine>,
    parameters: BendParameters,
}

/// 解析内存中的 GEO 文本。段结构不完整时按已读到的内容返回。
pub fn parse(source: &str) -> GeoPart {
    let mut machine = GeoMachine::default();
    for line in GeoTokenizer::new(source) {
        machine.step(line);
    }
    machine.finish()
}

impl<'a> GeoMachine<'a> {
    fn step(&mut self, line: GeoLine<'a>) {
        match line.token {
            GeoToken::SectionStart(id) => {
                self.state = GeoState::for_section(id);
                self.record.clear();
                debug!(line = line.line, section = id, state = ?self.state, "进入 GEO 段");
            }
            GeoToken::SectionEnd => {
                self.state = GeoState::Initial;
                self.record.clear();
            }
            GeoToken::RecordEnd => {
                self.finish_record();
                self.record.clear();
            }
            GeoToken::Text(text) => {
                if self.state != GeoState::Initial && !text.is_empty() {
                    if self.record.is_empty() {
                        self.record_line = line.line;
                    }
                    self.record.push(text);
                }
            }
        }
    }

    fn finish_record(&mut self) {
        let line = self.record_line;
        match self.state {
            GeoState::Points if self.record.first() == Some(&"P") => {
                let Some(coords) = self.record.get(2) else {
                    warn!(line, "P 记录缺少坐标行，已忽略");
                    return;
                };
                let mut fields = coords.split_whitespace();
                let x = lenient_f64(fields.next(), line, "点 X");
                let y = lenient_f64(fields.next(), line, "点 Y");
                self.table.push(Point2::new(x, y));
            }
            GeoState::Lines if self.is_lin_record() => {
                if let Some((a, b)) = self.resolve_indices(line) {
                    self.vertices.push(a);
                    self.vertices.push(b);
                }
            }
            GeoState::BendParameter => {
                let field = |index: usize| {
                    lenient_f64(
                        self.record
                            .get(index)
                            .and_then(|text| text.split_whitespace().next()),
                        line,
                        "折弯参数",
                    )
                };
                self.parameters = BendParameters {
                    angle: field(1),
                    radius: field(2),
                    factor: field(3).abs(),
                };
            }
            GeoState::BendLine if self.is_lin_record() => {
                if let Some((start, end)) = self.resolve_indices(line) {
                    let params = self.parameters;
                    self.bends.push(BendLine::new(
                        start,
                        end,
                        params.factor,
                        params.radius,
                        params.angle,
                    ));
                }
            }
            _ => {}
        }
    }

    fn is_lin_record(&self) -> bool {
        self.record.first() == Some(&"LIN")
    }

    fn resolve_indices(&self, line: usize) -> Option<(Point2, Point2)> {
        let Some(text) = self.record.get(2) else {
            warn!(line, "LIN 记录缺少索引行，已忽略");
            return None;
        };
        let mut fields = text.split_whitespace().map(|field| field.parse::<usize>());
        let (Some(Ok(a)), Some(Ok(b))) = (fields.next(), fields.next()) else {
            warn!(line, indices = *text, "LIN 索引无法解析，已忽略");
            return None;
        };
        match (self.point_at(a), self.point_at(b)) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => {
                warn!(line, a, b, table = self.table.len(), "LIN 索引超出点表范围，已忽略");
                None
            }
        }
    }

    /// 点表索引从 1 开始。
    fn point_at(&self, index: usize) -> Option<Point2> {
        index.checked_sub(1).and_then(|i| self.table.get(i)).copied()
    }

    fn finish(self) -> GeoPart {
        GeoPart {
            vertices: dedup_exact(&self.vertices),
            bends: self.bends,
        }
    }
}

fn lenient_f64(field: Option<&str>, line: usize, context: &str) -> f64 {
    match field.map(str::parse::<f64>) {
        Some(Ok(value)) => value,
        _ => {
            warn!(line, context, value = field.unwrap_or(""), "数值解析失败，按 0 处理");
            0.0
        }
    }
}

pub struct GeoWriter {
    path: PathBuf,
    options: ExportOptions,
}

impl GeoWriter {
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

    pub fn overwrite(&self, points: &[Point2], bends: &[BendLine]) -> Result<PathBuf, IoError> {
        let source = read_source(&self.path)?;
        let patched = patch(&source, points, bends, self.options.geo_precision)?;
        let target = sibling_output_path(&self.path, &self.options.output_prefix)?;
        write_atomically(&target, &patched)?;
        info!(
            source = %self.path.display(),
            target = %target.display(),
            points = points.len(),
            bends = bends.len(),
            "已写出 GEO"
        );
        Ok(target)
    }
}

struct PointTable {
    points: Vec<Point2>,
}

impl PointTable {
    /// 轮廓点与全部折弯线端点合并、去重，并按 x、y 升序排列。
    fn build(contour: &[Point2], bends: &[BendLine]) -> Self {
        let mut all: Vec<Point2> = contour.to_vec();
        for bend in bends {
            all.push(bend.start());
            all.push(bend.end());
        }
        let mut points = dedup_exact(&all);
        points.sort_by(|a, b| a.lexicographic_cmp(*b));
        Self { points }
    }

    fn index_of(&self, point: Point2) -> Result<usize, IoError> {
        self.points
            .iter()
            .position(|candidate| *candidate == point)
            .map(|i| i + 1)
            .ok_or_else(|| {
                IoError::InvalidGeometry(format!(
                    "点 ({}, {}) 不在点表中",
                    point.x(),
                    point.y()
                ))
            })
    }
}

/// 在内存中生成回写内容。`precision` 为坐标小数位数。
pub fn patch(
    source: &str,
    points: &[Point2],
    bends: &[BendLine],
    precision: usize,
) -> Result<String, IoError> {
    let newline = detect_newline(source);
    let contour = contour_order(points);
    let table = PointTable::build(&contour, bends);
    let mut out = String::with_capacity(source.len());
    let mut lines = GeoTokenizer::new(source);
    let mut bend_index = 0;

    while let Some(line) = lines.next() {
        let GeoToken::SectionStart(id) = line.token else {
            out.push_str(line.raw);
            continue;
        };
        let generated = match id {
            SECTION_POINTS => point_records(&table, precision, newline),
            SECTION_LINES => contour_records(&table, &contour, newline)?,
            SECTION_BEND_LINE => match bends.get(bend_index) {
                Some(bend) => {
                    bend_index += 1;
                    lin_record(
                        "4 0",
                        table.index_of(bend.start())?,
                        table.index_of(bend.end())?,
                        newline,
                    )
                }
                None => {
                    debug!(line = line.line, "没有更多折弯线，#~371 段保持原样");
                    out.push_str(line.raw);
                    continue;
                }
            },
            _ => {
                out.push_str(line.raw);
                continue;
            }
        };
        out.push_str(line.raw);
        out.push_str(&generated);
        out.push_str(skip_section(&mut lines, line.line)?);
    }

    if bend_index < bends.len() {
        debug!(
            written = bend_index,
            supplied = bends.len(),
            "文件中的 #~371 段少于当前折弯线数量"
        );
    }
    Ok(out)
}

/// 跳过段内剩余内容（支持嵌套段），返回结束标记 `##~~` 的原始行。
fn skip_section<'a>(lines: &mut GeoTokenizer<'a>, start_line: usize) -> Result<&'a str, IoError> {
    let mut depth = 0usize;
    for line in lines.by_ref() {
        match line.token {
            GeoToken::SectionStart(_) => depth += 1,
            GeoToken::SectionEnd if depth == 0 => return Ok(line.raw),
            GeoToken::SectionEnd => depth -= 1,
            _ => {}
        }
    }
    Err(IoError::malformed(start_line, "段缺少结束标记 ##~~"))
}

fn point_records(table: &PointTable, precision: usize, newline: &str) -> String {
    let mut out = String::new();
    for (i, point) in table.points.iter().enumerate() {
        out.push_str(&format!(
            "P{nl}{index}{nl}{x:.p$} {y:.p$} {z:.p$}{nl}|~{nl}",
            nl = newline,
            index = i + 1,
            x = point.x(),
            y = point.y(),
            z = 0.0,
            p = precision,
        ));
    }
    out
}

/// 轮廓按相邻点成对输出，超过两个点时补上首尾闭合边。
fn contour_records(
    table: &PointTable,
    contour: &[Point2],
    newline: &str,
) -> Result<String, IoError> {
    let mut out = String::new();
    let closing = (contour.len() > 2)
        .then(|| contour.last().zip(contour.first()))
        .flatten();
    let edges = contour
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .chain(closing.map(|(last, first)| (*last, *first)));
    for (a, b) in edges {
        out.push_str(&lin_record(
            "1 0",
            table.index_of(a)?,
            table.index_of(b)?,
            newline,
        ));
    }
    Ok(out)
}

fn lin_record(tag: &str, a: usize, b: usize, newline: &str) -> String {
    format!("LIN{newline}{tag}{newline}{a} {b}{newline}|~{newline}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLATE: &str = "#~1\nVERSION\n##~~\n#~31\nP\n1\n0.000000000 0.000000000 0.000000000\n|~\nP\n2\n100.000000000 0.000000000 0.000000000\n|~\nP\n3\n100.000000000 50.000000000 0.000000000\n|~\nP\n4\n0.000000000 50.000000000 0.000000000\n|~\nP\n5\n40.000000000 0.000000000 0.000000000\n|~\nP\n6\n40.000000000 50.000000000 0.000000000\n|~\n##~~\n#~331\nLIN\n1 0\n1 2\n|~\nLIN\n1 0\n2 3\n|~\nLIN\n1 0\n3 4\n|~\nLIN\n1 0\n4 1\n|~\n##~~\n#~37\nBEND\n90.000000000 deg\n1.500000000\n-3.250000000\n|~\n##~~\n#~371\nLIN\n4 0\n5 6\n|~\n##~~\n#~END\n##~~\n";

    #[test]
    fn tokenizer_classifies_markers() {
        let tokens: Vec<_> = GeoTokenizer::new("#~31\r\nP\r\n|~\r\n##~~\r\n")
            .map(|line| line.token)
            .collect();
        assert_eq!(
            tokens,
            vec![
                GeoToken::SectionStart("31"),
                GeoToken::Text("P"),
                GeoToken::RecordEnd,
                GeoToken::SectionEnd,
            ]
        );
    }

    #[test]
    fn parse_reads_contour_and_bends() {
        let part = parse(PLATE);
        assert_eq!(
            part.vertices,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(100.0, 0.0),
                Point2::new(100.0, 50.0),
                Point2::new(0.0, 50.0),
            ]
        );
        assert_eq!(part.bends.len(), 1);
        let bend = part.bends[0];
        assert_eq!(bend.start(), Point2::new(40.0, 0.0));
        assert_eq!(bend.end(), Point2::new(40.0, 50.0));
        assert_eq!(bend.angle, 90.0);
        assert_eq!(bend.radius, 1.5);
        assert_eq!(bend.deduction, 3.25);
    }

    #[test]
    fn out_of_range_indices_are_skipped() {
        let source = "#~31\nP\n1\n1 2 0\n|~\n##~~\n#~331\nLIN\n1 0\n1 9\n|~\nLIN\n1 0\nx y\n|~\n##~~\n";
        let part = parse(source);
        assert!(part.vertices.is_empty());
    }

    #[test]
    fn malformed_numbers_become_zero() {
        let source = "#~31\nP\n1\nabc 2 0\n|~\nP\n2\n5 5 0\n|~\n##~~\n#~331\nLIN\n1 0\n1 2\n|~\n##~~\n#~37\nBEND\nxx\n1\n2\n|~\n##~~\n#~371\nLIN\n4 0\n1 2\n|~\n##~~\n";
        let part = parse(source);
        assert_eq!(
            part.vertices,
            vec![Point2::new(0.0, 2.0), Point2::new(5.0, 5.0)]
        );
        assert_eq!(part.bends.len(), 1);
        let bend = part.bends[0];
        assert_eq!(bend.angle, 0.0);
        assert_eq!(bend.radius, 1.0);
        assert_eq!(bend.deduction, 2.0);
    }

    #[test]
    fn patch_regenerates_point_table_and_contour() {
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(120.0, 0.0),
            Point2::new(120.0, 60.0),
            Point2::new(0.0, 60.0),
        ];
        let bends = [BendLine::new(
            Point2::new(50.0, 0.0),
            Point2::new(50.0, 60.0),
            3.25,
            1.5,
            90.0,
        )];
        let patched = patch(PLATE, &points, &bends, 3).unwrap();
        assert!(patched.starts_with("#~1\nVERSION\n##~~\n#~31\nP\n1\n0.000 0.000 0.000\n|~\n"));
        assert!(patched.contains("P\n6\n120.000 60.000 0.000\n|~\n##~~\n#~331\n"));
        assert!(patched.contains("#~371\nLIN\n4 0\n3 4\n|~\n##~~\n"));
        assert!(patched.contains("#~37\nBEND\n90.000000000 deg\n"));
        assert!(patched.ends_with("#~END\n##~~\n"));

        let reread = parse(&patched);
        assert_eq!(reread.vertices, points.to_vec());
        assert_eq!(reread.bends[0].start(), Point2::new(50.0, 0.0));
        assert_eq!(reread.bends[0].deduction, 3.25);
    }

    #[test]
    fn surplus_bend_sections_are_kept() {
        let source = "#~371\nLIN\n4 0\n1 2\n|~\n##~~\n";
        let patched = patch(source, &[], &[], 9).unwrap();
        assert_eq!(patched, source);
    }

    #[test]
    fn unterminated_section_is_malformed() {
        let err = patch("#~31\nP\n1\n", &[Point2::new(0.0, 0.0)], &[], 9).unwrap_err();
        assert!(matches!(err, IoError::Malformed { line: 1, .. }));
    }
}
