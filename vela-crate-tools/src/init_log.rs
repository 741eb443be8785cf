use std::io::Write;

/// 使用默认的 Info 级别初始化日志
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

/// 初始化日志，`RUST_LOG` 环境变量会覆盖传入的级别
///
/// 严重错误统一使用 `log::error!("[CRITICAL] ...")` 输出，这里会为其使用加粗样式。
pub fn init_log_with_level(level: log::LevelFilter) {
    let _ = builder(level).try_init();
}

/// 解析配置文件中的日志级别字符串，无法识别时回退到 Info
pub fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}

fn builder(level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let message = record.args().to_string();
            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error if message.starts_with("[CRITICAL]") => error_style.bold(),
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
            let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level}: {message}{level_style:#}\n\t {grey_style}At {file}:{line}{grey_style:#}",
            )
        })
        .filter(None, level)
        .parse_default_env();
    builder
}
