pub mod dxf;
pub mod geo;
pub mod sketch;

mod output;

use std::path::{Path, PathBuf};

use serde::Serialize;
use sheetbend_core::document::ShapeError;
use sheetbend_core::geometry::{BendLine, Point2};
use thiserror::Error;

pub use dxf::{DxfPart, DxfReader, DxfWriter};
pub use geo::{GeoPart, GeoReader, GeoWriter};
pub use output::sibling_output_path;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed input at line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("invalid path {0:?}")]
    InvalidPath(PathBuf),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

impl IoError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }
}

/// 写出选项。默认值即 `modified_` 前缀与 GEO 九位小数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub output_prefix: String,
    pub geo_precision: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_prefix: "modified_".to_string(),
            geo_precision: 9,
        }
    }
}

/// 支持的交换格式，按扩展名（不区分大小写）识别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartFormat {
    Dxf,
    Geo,
}

impl PartFormat {
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("dxf") => Ok(PartFormat::Dxf),
            Some("geo") => Ok(PartFormat::Geo),
            _ => Err(IoError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PartFormat::Dxf => "DXF",
            PartFormat::Geo => "GEO",
        }
    }
}

/// 两种格式读取结果的统一形式。GEO 轮廓始终闭合，且不含板厚。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartData {
    pub vertices: Vec<Point2>,
    pub bends: Vec<BendLine>,
    pub thickness: f64,
    pub closed: bool,
}

impl From<DxfPart> for PartData {
    fn from(part: DxfPart) -> Self {
        Self {
            vertices: part.vertices,
            bends: part.bends,
            thickness: part.thickness,
            closed: part.closed,
        }
    }
}

impl From<GeoPart> for PartData {
    fn from(part: GeoPart) -> Self {
        Self {
            vertices: part.vertices,
            bends: part.bends,
            thickness: 0.0,
            closed: true,
        }
    }
}

pub trait PartLoader {
    fn load(&self, path: &Path) -> Result<PartData, IoError>;
}

pub trait PartSaver {
    /// 将点与折弯线写入 `path` 的同目录副本，返回副本路径。源文件保持不变。
    fn save(
        &self,
        path: &Path,
        points: &[Point2],
        bends: &[BendLine],
        options: &ExportOptions,
    ) -> Result<PathBuf, IoError>;
}

pub struct DxfFacade;

impl PartLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<PartData, IoError> {
        DxfReader::new(path).read().map(PartData::from)
    }
}

impl PartSaver for DxfFacade {
    fn save(
        &self,
        path: &Path,
        points: &[Point2],
        bends: &[BendLine],
        options: &ExportOptions,
    ) -> Result<PathBuf, IoError> {
        DxfWriter::new(path)
            .with_options(options.clone())
            .overwrite(points, bends)
    }
}

pub struct GeoFacade;

impl PartLoader for GeoFacade {
    fn load(&self, path: &Path) -> Result<PartData, IoError> {
        GeoReader::new(path).read().map(PartData::from)
    }
}

impl PartSaver for GeoFacade {
    fn save(
        &self,
        path: &Path,
        points: &[Point2],
        bends: &[BendLine],
        options: &ExportOptions,
    ) -> Result<PathBuf, IoError> {
        GeoWriter::new(path)
            .with_options(options.clone())
            .overwrite(points, bends)
    }
}

fn codec(format: PartFormat) -> (&'static dyn PartLoader, &'static dyn PartSaver) {
    match format {
        PartFormat::Dxf => (&DxfFacade, &DxfFacade),
        PartFormat::Geo => (&GeoFacade, &GeoFacade),
    }
}

/// 按扩展名选择读取器。
pub fn read_part(path: &Path) -> Result<PartData, IoError> {
    let (loader, _) = codec(PartFormat::from_path(path)?);
    loader.load(path)
}

/// 按扩展名选择写出器，返回生成的副本路径。
pub fn write_part(
    path: &Path,
    points: &[Point2],
    bends: &[BendLine],
    options: &ExportOptions,
) -> Result<PathBuf, IoError> {
    let (_, saver) = codec(PartFormat::from_path(path)?);
    saver.save(path, points, bends, options)
}
