use crate::{
    config::Config,
    engine::{ConversionJob, Engine, pandoc::PandocEngine},
    formats::{Format, catalog},
    request::{ConversionRequest, OptionSet},
    server::{AppContext, start_server},
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_appender::{non_blocking::WorkerGuard, rolling::RollingFileAppender};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pandoc-web")]
#[command(about = "Upload-and-convert HTTP front end for pandoc")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./pandoc-web.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Report whether the engine can be found and which version it is.
    Doctor {},
    /// Print the format catalog.
    Formats {},
    /// Convert one local file.
    Convert {
        #[arg(long)]
        input: PathBuf,
        /// Source format; guessed from the input extension when omitted.
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: String,
        /// Defaults to the input path with the target extension.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        toc: bool,
        #[arg(long)]
        number_sections: bool,
        #[arg(long)]
        bibliography: bool,
        #[arg(long)]
        css: bool,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;

    match &args.cmd {
        Command::Serve { host, port } => serve(cfg, host.clone(), *port),
        Command::Doctor {} => doctor(&cfg),
        Command::Formats {} => {
            println!("{}", serde_json::to_string_pretty(&catalog())?);
            Ok(())
        }
        Command::Convert {
            input,
            from,
            to,
            output,
            toc,
            number_sections,
            bibliography,
            css,
        } => {
            let options = OptionSet {
                toc: *toc,
                number_sections: *number_sections,
                bibliography: *bibliography,
                css: *css,
            };
            convert(&cfg, input, from.as_deref(), to, output.as_deref(), options)
        }
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    for candidate in ["pandoc-web.toml", "pandoc-web.example.toml"] {
        let p = Path::new(candidate);
        if p.exists() {
            return Config::load(p);
        }
    }
    Config::from_env()
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(dir)?;
        let prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("log file path has no file name: {}", path.display()))?;
        let appender = RollingFileAppender::builder()
            .rotation(cfg.logging.rotation()?)
            .filename_prefix(prefix)
            .build(dir)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("logs").join("pandoc-web.log"))
}

fn serve(mut cfg: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }

    if cfg.debug.dump_effective_config {
        debug!("effective config:\n{}", toml::to_string(&cfg).unwrap_or_default());
    }

    let engine = PandocEngine::new(&cfg);
    let probe = engine.probe();
    if probe.available {
        info!("engine ready: {} {}", cfg.engine.executable, probe.version.as_deref().unwrap_or("?"));
    } else {
        tracing::warn!(
            "engine not available, conversions will fail until it is installed: {}",
            probe.error.as_deref().unwrap_or("unknown")
        );
    }

    let ctx = AppContext::new(cfg, Arc::new(engine));
    // Conversions run on the blocking pool; request handling stays on one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(start_server(ctx))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = PandocEngine::new(cfg);
    let diag = engine.probe();
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn convert(
    cfg: &Config,
    input: &Path,
    from: Option<&str>,
    to: &str,
    output: Option<&Path>,
    options: OptionSet,
) -> Result<()> {
    if !input.is_file() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    let from = match from {
        Some(f) => Format::parse_input(f)?,
        None => guess_source_format(input)?,
    };
    let to = Format::parse_output(to)?;
    let request = ConversionRequest::new(from, to, options);

    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension(to.file_extension()));
    if output == input {
        return Err(anyhow!("output would overwrite input: {}", output.display()));
    }
    let media_dir = output.with_extension("media");

    let engine = PandocEngine::new(cfg);
    let job = ConversionJob {
        input: input.to_path_buf(),
        output,
        media_dir,
        request,
    };

    let started_at = now_rfc3339();
    let started = Instant::now();
    let out = engine
        .convert(&job)
        .with_context(|| format!("converting {}", input.display()))?;
    info!("wrote {} in {:?}", out.display(), started.elapsed());

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "output": out,
            "request": request,
            "started": started_at,
            "status": "ok"
        }))?
    );
    Ok(())
}

fn guess_source_format(input: &Path) -> Result<Format> {
    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| format!(".{}", s.to_ascii_lowercase()))
        .ok_or_else(|| anyhow!("cannot guess format without an extension; pass --from"))?;
    Format::ALL
        .into_iter()
        .filter(|f| f.is_readable())
        .find(|f| f.extensions().contains(&ext.as_str()))
        .ok_or_else(|| anyhow!("unknown input extension {ext}; pass --from"))
}
