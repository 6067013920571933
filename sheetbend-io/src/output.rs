use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sheetbend_core::geometry::{Point2, dedup_exact, sort_anticlockwise};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::IoError;

/// `dir/name.ext` → `dir/<prefix>name.ext`。
pub fn sibling_output_path(source: &Path, prefix: &str) -> Result<PathBuf, IoError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| IoError::InvalidPath(source.to_path_buf()))?;
    let mut name = OsString::from(prefix);
    name.push(file_name);
    Ok(match source.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    })
}

pub(crate) fn read_source(path: &Path) -> Result<String, IoError> {
    fs::read_to_string(path).map_err(|source| IoError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// 先写入同目录临时文件，再整体改名到目标路径；失败时目标与源文件均不受影响。
pub(crate) fn write_atomically(target: &Path, contents: &str) -> Result<(), IoError> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let write_error = |source: std::io::Error| IoError::WriteError {
        path: target.to_path_buf(),
        source,
    };
    let mut temp = NamedTempFile::new_in(&dir).map_err(write_error)?;
    temp.write_all(contents.as_bytes()).map_err(write_error)?;
    temp.flush().map_err(write_error)?;
    temp.persist(target).map_err(|err| write_error(err.error))?;
    debug!(path = %target.display(), bytes = contents.len(), "已写出文件");
    Ok(())
}

/// 写出前的轮廓点顺序：精确去重，超过两个点时按逆时针排序。
pub(crate) fn contour_order(points: &[Point2]) -> Vec<Point2> {
    let distinct = dedup_exact(points);
    if distinct.len() > 2 {
        sort_anticlockwise(&distinct)
    } else {
        distinct
    }
}

/// 沿用源文件的换行风格。
pub(crate) fn detect_newline(source: &str) -> &'static str {
    if source.contains("\r\n") { "\r\n" } else { "\n" }
}

/// 行尾的换行符部分（可能为空）。
pub(crate) fn line_terminator(raw: &str) -> &str {
    let body = raw.trim_end_matches(['\r', '\n']);
    &raw[body.len()..]
}

/// 按行切分并保留行尾，同时记录行号（从 1 开始）。
pub(crate) struct RawLines<'a> {
    source: &'a str,
    offset: usize,
    line_number: usize,
}

impl<'a> RawLines<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line_number: 0,
        }
    }

    #[inline]
    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    #[inline]
    pub(crate) fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    /// 从 `start` 到当前游标的原始字节。
    #[inline]
    pub(crate) fn slice_from(&self, start: usize) -> &'a str {
        &self.source[start..self.offset]
    }

    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for RawLines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }
        let len = rest.find('\n').map(|idx| idx + 1).unwrap_or(rest.len());
        self.offset += len;
        self.line_number += 1;
        Some(&rest[..len])
    }
}
