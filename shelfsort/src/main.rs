use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use shelfsort::config::prediction_endpoint;
use shelfsort::{Config, ShelfService, transport};

const USAGE: &str = "\
Usage: shelfsort-server [options]

Options:
  --host <host>              Bind address [env: HOST, default: 0.0.0.0]
  --port <port>              Bind port [env: PORT, default: 4200]
  --upload-dir <dir>         Upload storage root [env: UPLOAD_DIR, default: ./uploads]
  --prediction-url <url>     Prediction service base URL [env: PREDICTION_SERVICE_URL]
  --await-explicit-shutdown  Ignore SIGTERM, wait for /shutdown or SIGINT
  -h, --help                 Print this help";

/// Command line overrides, applied on top of the environment.
#[derive(Debug, Default, PartialEq)]
struct Args {
    host: Option<String>,
    port: Option<u16>,
    upload_dir: Option<PathBuf>,
    prediction_url: Option<String>,
    await_explicit_shutdown: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.upload_dir {
            config.upload_dir = dir;
        }
        if let Some(url) = self.prediction_url {
            config.prediction_url = prediction_endpoint(&url);
        }
        if self.await_explicit_shutdown {
            config.server.await_explicit_shutdown = true;
        }
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                parsed.host = Some(args.get(i).ok_or("--host requires a value")?.clone());
            }
            "--port" => {
                i += 1;
                let port = args.get(i).ok_or("--port requires a value")?;
                parsed.port = Some(
                    port.parse::<u16>()
                        .map_err(|e| format!("invalid port '{port}': {e}"))?,
                );
            }
            "--upload-dir" => {
                i += 1;
                parsed.upload_dir = Some(PathBuf::from(
                    args.get(i).ok_or("--upload-dir requires a value")?,
                ));
            }
            "--prediction-url" => {
                i += 1;
                parsed.prediction_url = Some(
                    args.get(i)
                        .ok_or("--prediction-url requires a value")?
                        .clone(),
                );
            }
            "--await-explicit-shutdown" => parsed.await_explicit_shutdown = true,
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    Ok(parsed)
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("SHELFSORT_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("shelfsort={level},shelfsort_server={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let overrides = match parse_args(&args) {
        Ok(overrides) => overrides,
        Err(msg) if msg.is_empty() => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    init_tracing();

    let mut config = Config::from_env()?;
    overrides.apply(&mut config);

    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        prediction_url = %config.prediction_url,
        prediction_concurrency = config.prediction_concurrency,
        "Configuration loaded"
    );

    let service = Arc::new(ShelfService::from_config(&config)?);
    transport::serve(config.server, service).await
}
