use std::path::Path;

use serde::Serialize;
use sheetbend_core::document::Document;
use sheetbend_core::geometry::{BendLine, Bounds2D, Point2};
use sheetbend_io::{PartData, PartFormat};

/// `inspect --json` 的输出结构。
#[derive(Debug, Serialize)]
pub struct PartReport<'a> {
    pub path: String,
    pub format: PartFormat,
    #[serde(flatten)]
    pub part: &'a PartData,
    pub bounds: Option<Bounds2D>,
}

impl<'a> PartReport<'a> {
    pub fn new(path: &Path, format: PartFormat, part: &'a PartData) -> Self {
        let bounds = (!part.vertices.is_empty())
            .then(|| Bounds2D::from_points(part.vertices.iter().copied()));
        Self {
            path: path.display().to_string(),
            format,
            part,
            bounds,
        }
    }
}

pub fn print_part(path: &Path, format: PartFormat, part: &PartData) {
    println!("{} 零件：{}", format.name(), path.display());
    println!("顶点数: {}", part.vertices.len());
    println!("折弯线数: {}", part.bends.len());
    println!("板厚: {}", part.thickness);
    println!("闭合: {}", if part.closed { "是" } else { "否" });
    if !part.vertices.is_empty() {
        print_bounds(&Bounds2D::from_points(part.vertices.iter().copied()));
    }

    println!("顶点：");
    for point in &part.vertices {
        println!("  - {}", format_point(*point));
    }
    if !part.bends.is_empty() {
        println!("折弯线：");
        for (index, bend) in part.bends.iter().enumerate() {
            print_bend(index, bend);
        }
    }
}

pub fn print_document(document: &Document) {
    println!(
        "文档包含 {} 条多段线、{} 条折弯线",
        document.polylines().len(),
        document.bend_lines().len()
    );
    for (index, polyline) in document.polylines().iter().enumerate() {
        let points: Vec<String> = polyline.points().iter().map(|p| format_point(*p)).collect();
        println!(
            "  - #{index} {}{}: {}",
            polyline.kind(),
            if polyline.is_closed() { " (闭合)" } else { "" },
            points.join(" ")
        );
    }
    for (index, bend) in document.bend_lines().iter().enumerate() {
        print_bend(index, bend);
    }
    if let Some(bounds) = document.bounds() {
        print_bounds(&bounds);
    }
}

fn print_bend(index: usize, bend: &BendLine) {
    println!(
        "  - 折弯 #{index}: {} -> {}, 角度={}, 半径={}, 扣除量={}",
        format_point(bend.start()),
        format_point(bend.end()),
        bend.angle,
        bend.radius,
        bend.deduction
    );
}

fn print_bounds(bounds: &Bounds2D) {
    println!(
        "包围盒: ({:.3}, {:.3}) - ({:.3}, {:.3})，宽={:.3}，高={:.3}",
        bounds.min_x(),
        bounds.min_y(),
        bounds.max_x(),
        bounds.max_y(),
        bounds.width(),
        bounds.height()
    );
}

fn format_point(point: Point2) -> String {
    format!("({}, {})", point.x(), point.y())
}
