use std::collections::HashMap;
use std::path::Path;

use sheetbend_core::document::ShapeKind;
use sheetbend_core::geometry::Point2;
use tracing::debug;

use crate::session::Session;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// 按空白切分一行命令文本，首个词为命令名。
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        Some(Self {
            name: name.to_ascii_lowercase(),
            args: words.map(str::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut Session,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(UndoCommand);
        bus.register(RedoCommand);
        bus.register(ResetHistoryCommand);
        bus.register(CloseCommand);
        bus.register(OpenCommand);
        bus.register(SaveCommand);
        bus.register(AddShapeCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            debug!(command = %request.name, args = ?request.args, "执行命令");
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct UndoCommand;

impl CommandHandler for UndoCommand {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.session.undo();
        CommandResponse::ok(format!(
            "已撤销，剩余 {} 条多段线",
            context.session.document().polylines().len()
        ))
    }
}

struct RedoCommand;

impl CommandHandler for RedoCommand {
    fn name(&self) -> &'static str {
        "redo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if !context.session.history().can_redo() {
            return CommandResponse::ok("没有可重做的操作");
        }
        context.session.redo();
        CommandResponse::ok(format!(
            "已重做，当前 {} 条多段线",
            context.session.document().polylines().len()
        ))
    }
}

struct ResetHistoryCommand;

impl CommandHandler for ResetHistoryCommand {
    fn name(&self) -> &'static str {
        "reset"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.session.reset_history();
        CommandResponse::ok("撤销历史已清空")
    }
}

struct CloseCommand;

impl CommandHandler for CloseCommand {
    fn name(&self) -> &'static str {
        "close"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.session.new_document();
        CommandResponse::ok("文档已关闭")
    }
}

struct OpenCommand;

impl CommandHandler for OpenCommand {
    fn name(&self) -> &'static str {
        "open"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(path) = request.args.first() else {
            return CommandResponse::err("open 需要文件路径");
        };
        match context.session.open(Path::new(path)) {
            Ok(()) => CommandResponse::ok(format!("已打开 {path}")),
            Err(err) => CommandResponse::err(format!("打开 {path} 失败: {err}")),
        }
    }
}

struct SaveCommand;

impl CommandHandler for SaveCommand {
    fn name(&self) -> &'static str {
        "save"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.save() {
            Ok(path) => CommandResponse::ok(format!("已保存到 {}", path.display())),
            Err(err) => CommandResponse::err(format!("保存失败: {err}")),
        }
    }
}

/// `add <KIND> x,y x,y ...`
struct AddShapeCommand;

impl CommandHandler for AddShapeCommand {
    fn name(&self) -> &'static str {
        "add"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some((kind, coords)) = request.args.split_first() else {
            return CommandResponse::err("add 需要实体分类与坐标");
        };
        let kind = match kind.parse::<ShapeKind>() {
            Ok(kind) => kind,
            Err(err) => return CommandResponse::err(err.to_string()),
        };
        let mut points = Vec::with_capacity(coords.len());
        for coord in coords {
            match parse_point(coord) {
                Some(point) => points.push(point),
                None => return CommandResponse::err(format!("无法解析坐标: {coord}")),
            }
        }
        match context.session.add_shape(kind, points) {
            Ok(index) => CommandResponse::ok(format!("已添加 {kind} #{index}")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

fn parse_point(text: &str) -> Option<Point2> {
    let (x, y) = text.split_once(',')?;
    Some(Point2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}
