pub mod command;

pub mod errors {
    use std::path::PathBuf;

    use sheetbend_core::document::ShapeError;
    use sheetbend_io::IoError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("no source file is associated with the current document")]
        NoDocumentSource,
        #[error("unsupported file extension: {0:?}")]
        UnsupportedExtension(PathBuf),
        #[error(transparent)]
        Io(#[from] IoError),
        #[error(transparent)]
        Shape(#[from] ShapeError),
    }
}

pub mod history {
    use sheetbend_core::document::{Document, Polyline};
    use tracing::debug;

    /// 撤销/重做栈，保存的是多段线的副本。
    ///
    /// 新的编辑（`push`）会清空重做栈，因此重做只在撤销之后、下一次编辑之前有效。
    #[derive(Debug, Default, Clone)]
    pub struct History {
        undo_stack: Vec<Polyline>,
        redo_stack: Vec<Polyline>,
    }

    impl History {
        pub fn new() -> Self {
            Self::default()
        }

        /// 文档非空时复制最后一条多段线到撤销栈，并清空重做栈。
        pub fn push(&mut self, document: &Document) {
            if let Some(last) = document.last_polyline() {
                self.undo_stack.push(last.clone());
            }
            self.redo_stack.clear();
        }

        /// 先执行一次 `push` 记录当前状态，再把撤销栈顶移入重做栈并删除文档最后一条多段线。
        pub fn undo(&mut self, document: &mut Document) {
            self.push(document);
            if document.polylines().is_empty() {
                return;
            }
            if let Some(entry) = self.undo_stack.pop() {
                document.pop_polyline();
                debug!(
                    undo = self.undo_stack.len(),
                    redo = self.redo_stack.len() + 1,
                    "撤销"
                );
                self.redo_stack.push(entry);
            }
        }

        pub fn redo(&mut self, document: &mut Document) {
            if let Some(entry) = self.redo_stack.pop() {
                self.undo_stack.push(entry.clone());
                document.add_polyline(entry);
                debug!(
                    undo = self.undo_stack.len(),
                    redo = self.redo_stack.len(),
                    "重做"
                );
            }
        }

        /// 清空两个栈，文档保持不变。
        pub fn reset(&mut self) {
            self.undo_stack.clear();
            self.redo_stack.clear();
        }

        #[inline]
        pub fn can_undo(&self) -> bool {
            !self.undo_stack.is_empty()
        }

        #[inline]
        pub fn can_redo(&self) -> bool {
            !self.redo_stack.is_empty()
        }

        #[inline]
        pub fn undo_depth(&self) -> usize {
            self.undo_stack.len()
        }

        #[inline]
        pub fn redo_depth(&self) -> usize {
            self.redo_stack.len()
        }
    }

}

pub mod session {
    use std::path::{Path, PathBuf};

    use sheetbend_core::document::{Document, Polyline, ShapeKind};
    use sheetbend_core::geometry::{BendLine, Bounds2D, Point2};
    use sheetbend_io::{ExportOptions, IoError, PartData, PartFormat, read_part, write_part};
    use tracing::{debug, info};

    use crate::errors::EngineError;
    use crate::history::History;

    /// 当前文档对应的源文件。
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SourceFile {
        pub path: PathBuf,
        pub format: PartFormat,
    }

    /// 一次编辑会话：文档、撤销历史、源文件与修改标记。
    #[derive(Debug, Default)]
    pub struct Session {
        document: Document,
        history: History,
        source: Option<SourceFile>,
        thickness: f64,
        modified: bool,
        export: ExportOptions,
    }

    impl Session {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_export_options(export: ExportOptions) -> Self {
            Self {
                export,
                ..Self::default()
            }
        }

        /// 打开零件文件，替换当前文档并清空历史。
        pub fn open(&mut self, path: &Path) -> Result<(), EngineError> {
            let format = PartFormat::from_path(path).map_err(|err| match err {
                IoError::UnsupportedFormat(_) => EngineError::UnsupportedExtension(path.to_path_buf()),
                other => EngineError::Io(other),
            })?;
            let part = read_part(path)?;
            self.new_document();
            self.thickness = part.thickness;
            self.import_part(part);
            self.modified = false;
            self.source = Some(SourceFile {
                path: path.to_path_buf(),
                format,
            });
            info!(
                path = %path.display(),
                format = format.name(),
                polylines = self.document.polylines().len(),
                bends = self.document.bend_lines().len(),
                "已打开零件"
            );
            Ok(())
        }

        /// 外轮廓作为一条多段线追加到文档，折弯线全部追加到折弯线列表。
        pub fn import_part(&mut self, part: PartData) -> usize {
            let mut outline = Polyline::new(part.vertices, ShapeKind::Polyline);
            if part.closed {
                outline.close();
            }
            let index = self.document.add_polyline(outline);
            for bend in part.bends {
                self.document.add_bend_line(bend);
            }
            self.modified = true;
            index
        }

        /// 按分类创建实体并记录历史。
        pub fn add_shape(
            &mut self,
            kind: ShapeKind,
            points: Vec<Point2>,
        ) -> Result<usize, EngineError> {
            let polyline = Polyline::create_shape(kind, points)?;
            Ok(self.add_polyline(polyline))
        }

        pub fn add_polyline(&mut self, polyline: Polyline) -> usize {
            let index = self.document.add_polyline(polyline);
            self.history.push(&self.document);
            self.modified = true;
            debug!(index, "已添加实体");
            index
        }

        pub fn add_bend_line(&mut self, bend: BendLine) -> usize {
            self.modified = true;
            self.document.add_bend_line(bend)
        }

        pub fn undo(&mut self) {
            let before = self.document.polylines().len();
            self.history.undo(&mut self.document);
            if self.document.polylines().len() != before {
                self.modified = true;
            }
        }

        pub fn redo(&mut self) {
            let before = self.document.polylines().len();
            self.history.redo(&mut self.document);
            if self.document.polylines().len() != before {
                self.modified = true;
            }
        }

        pub fn reset_history(&mut self) {
            self.history.reset();
        }

        /// 清空文档与历史，并与源文件解除关联。
        pub fn new_document(&mut self) {
            self.document.reset();
            self.history.reset();
            self.source = None;
            self.thickness = 0.0;
            self.modified = false;
        }

        /// 以最后一条多段线的点与全部折弯线写出到源文件的同目录副本。
        pub fn save(&mut self) -> Result<PathBuf, EngineError> {
            let source = self.source.as_ref().ok_or(EngineError::NoDocumentSource)?;
            let points: &[Point2] = self
                .document
                .last_polyline()
                .map(Polyline::points)
                .unwrap_or_default();
            let written = write_part(
                &source.path,
                points,
                self.document.bend_lines(),
                &self.export,
            )?;
            self.modified = false;
            info!(target = %written.display(), "已保存零件");
            Ok(written)
        }

        #[inline]
        pub fn document(&self) -> &Document {
            &self.document
        }


        #[inline]
        pub fn history(&self) -> &History {
            &self.history
        }

        #[inline]
        pub fn source(&self) -> Option<&SourceFile> {
            self.source.as_ref()
        }

        #[inline]
        pub fn thickness(&self) -> f64 {
            self.thickness
        }

        #[inline]
        pub fn is_modified(&self) -> bool {
            self.modified
        }

        #[inline]
        pub fn export_options(&self) -> &ExportOptions {
            &self.export
        }

        pub fn bounds(&self) -> Option<Bounds2D> {
            self.document.bounds()
        }
    }

}
