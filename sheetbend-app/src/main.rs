use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sheetbend_config::{AppConfig, ConfigError};
use sheetbend_engine::command::{CommandBus, CommandContext, CommandRequest};
use sheetbend_engine::session::Session;
use sheetbend_io::{ExportOptions, PartFormat, read_part, sketch};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod report;

/// 钣金展开图的检查与回写工具。
#[derive(Debug, Parser)]
#[command(name = "sheetbend", version)]
struct Cli {
    /// 指定配置文件，跳过自动发现
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 读取 DXF/GEO 零件并打印顶点、折弯线与包围盒
    Inspect {
        file: PathBuf,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 读取零件后原样写回到 `modified_` 副本
    Rewrite { file: PathBuf },
    /// 打开零件并依次执行命令，例如 `"add LINE 0,0 10,0" undo save`
    Exec {
        file: PathBuf,
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// 读取草图文本文件并打印其中的多段线
    Sketch { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, discovery_error) = match load_configuration(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            init_logging(&AppConfig::default());
            error!(error = %err, "加载指定配置失败");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);
    if let Some(err) = discovery_error {
        report_discovery_error(&err);
    }
    info!("启动 sheetbend");

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "执行失败");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Command::Inspect { file, json } => inspect(&file, json),
        Command::Rewrite { file } => rewrite(&file, config),
        Command::Exec { file, commands } => exec(&file, &commands, config),
        Command::Sketch { file } => show_sketch(&file),
    }
}

fn inspect(file: &Path, json: bool) -> anyhow::Result<()> {
    let format = PartFormat::from_path(file)?;
    let part = read_part(file).with_context(|| format!("读取 {} 失败", file.display()))?;
    if json {
        let summary = report::PartReport::new(file, format, &part);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_part(file, format, &part);
    }
    Ok(())
}

fn rewrite(file: &Path, config: &AppConfig) -> anyhow::Result<()> {
    let mut session = Session::with_export_options(export_options(config));
    session
        .open(file)
        .with_context(|| format!("打开 {} 失败", file.display()))?;
    let written = session.save()?;
    println!("已写出：{}", written.display());
    Ok(())
}

fn exec(file: &Path, commands: &[String], config: &AppConfig) -> anyhow::Result<()> {
    let mut session = Session::with_export_options(export_options(config));
    session
        .open(file)
        .with_context(|| format!("打开 {} 失败", file.display()))?;

    let bus = CommandBus::new();
    let mut context = CommandContext {
        session: &mut session,
    };
    for line in commands {
        let Some(request) = CommandRequest::parse(line) else {
            continue;
        };
        let response = bus.dispatch(&request, &mut context);
        let message = response.message.unwrap_or_default();
        if !response.success {
            let mut available: Vec<&str> = bus.available_commands().copied().collect();
            available.sort_unstable();
            bail!("命令 `{line}` 失败: {message}（支持的命令: {}）", available.join(", "));
        }
        println!("{message}");
    }

    report::print_document(context.session.document());
    if context.session.is_modified() {
        warn!("存在未保存的修改");
    }
    Ok(())
}

fn show_sketch(file: &Path) -> anyhow::Result<()> {
    let polylines = sketch::load(file)?;
    let mut session = Session::new();
    for polyline in polylines {
        session.add_polyline(polyline);
    }
    report::print_document(session.document());
    Ok(())
}

fn export_options(config: &AppConfig) -> ExportOptions {
    ExportOptions {
        output_prefix: config.export.output_prefix.clone(),
        geo_precision: config.export.geo_precision,
    }
}

/// 显式指定的配置出错时直接返回错误；自动发现出错时退回默认配置，并把错误交给调用方在日志初始化后输出。
fn load_configuration(
    override_path: Option<&Path>,
) -> Result<(AppConfig, Option<ConfigError>), ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(path).map(|cfg| (cfg, None)),
        None => Ok(match AppConfig::discover() {
            Ok(cfg) => (cfg, None),
            Err(err) => (AppConfig::default(), Some(err)),
        }),
    }
}

fn report_discovery_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
        }
        ConfigError::Invalid(_) | ConfigError::Context { .. } => {
            warn!(error = %err, "加载默认配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
