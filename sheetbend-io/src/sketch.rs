//! 草图的原生文本格式。
//!
//! 每个实体一个块：首行为分类（可带 `closed`），其后每行一个 `x,y` 坐标，每个块之后跟一个空行。
//!
//! ```text
//! RECTANGLE closed
//! 0,0
//! 100,0
//! 100,50
//! 0,50
//! ```

use std::path::Path;

use sheetbend_core::document::{Polyline, ShapeKind};
use sheetbend_core::geometry::Point2;
use tracing::{info, warn};

use crate::IoError;
use crate::output::{read_source, write_atomically};

const CLOSED_FLAG: &str = "closed";

pub fn to_string(polylines: &[Polyline]) -> String {
    let mut out = String::new();
    for polyline in polylines {
        out.push_str(polyline.kind().as_str());
        if polyline.is_closed() {
            out.push(' ');
            out.push_str(CLOSED_FLAG);
        }
        out.push('\n');
        for point in polyline.points() {
            out.push_str(&format!("{},{}\n", point.x(), point.y()));
        }
        out.push('\n');
    }
    out
}

pub fn parse(source: &str) -> Result<Vec<Polyline>, IoError> {
    let mut polylines = Vec::new();
    let mut block: Option<(ShapeKind, bool, Vec<Point2>)> = None;

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let text = line.trim();
        if text.is_empty() {
            if let Some(done) = block.take() {
                polylines.push(build(done)?);
            }
            continue;
        }
        match block.as_mut() {
            None => {
                let mut fields = text.split_whitespace();
                let kind = fields.next().unwrap_or_default().parse::<ShapeKind>()?;
                let closed = match fields.next() {
                    None => false,
                    Some(flag) if flag.eq_ignore_ascii_case(CLOSED_FLAG) => true,
                    Some(other) => {
                        return Err(IoError::malformed(
                            line_number,
                            format!("未知的实体标记 \"{other}\""),
                        ));
                    }
                };
                block = Some((kind, closed, Vec::new()));
            }
            Some((_, _, points)) => match parse_point(text) {
                Some(point) => points.push(point),
                None => warn!(line = line_number, text, "坐标行无法解析，已跳过"),
            },
        }
    }
    if let Some(done) = block.take() {
        polylines.push(build(done)?);
    }
    Ok(polylines)
}

fn parse_point(text: &str) -> Option<Point2> {
    let (x, y) = text.split_once(',')?;
    Some(Point2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn build((kind, closed, points): (ShapeKind, bool, Vec<Point2>)) -> Result<Polyline, IoError> {
    let mut polyline = Polyline::create_shape(kind, points)?;
    if closed {
        polyline.close();
    }
    Ok(polyline)
}

pub fn save(path: &Path, polylines: &[Polyline]) -> Result<(), IoError> {
    write_atomically(path, &to_string(polylines))?;
    info!(path = %path.display(), polylines = polylines.len(), "已保存草图");
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<Polyline>, IoError> {
    let polylines = parse(&read_source(path)?)?;
    info!(path = %path.display(), polylines = polylines.len(), "已读取草图");
    Ok(polylines)
}
