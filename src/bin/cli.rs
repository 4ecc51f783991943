use ipcam_recorder::{
    init_logging, HttpFetcher, RecorderConfig, RecorderSession, StreamResolver,
};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "resolve" => cmd_resolve(&args),
        "record" => cmd_record(&args),
        "--version" | "version" => {
            println!("{} {}", ipcam_recorder::NAME, ipcam_recorder::VERSION);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: ipcam-recorder <command> [args]");
    eprintln!("  resolve <address> [--config <path>]");
    eprintln!("  record <address> <folder> [--config <path>] [--json]");
}

struct Options {
    positional: Vec<String>,
    config_path: Option<String>,
    json: bool,
}

fn parse_options(args: &[String]) -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = Options {
        positional: Vec::new(),
        config_path: None,
        json: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a path")?;
                options.config_path = Some(path.clone());
            }
            "--json" => options.json = true,
            other => options.positional.push(other.to_string()),
        }
        i += 1;
    }

    Ok(options)
}

fn load_config(options: &Options) -> Result<RecorderConfig, Box<dyn std::error::Error>> {
    match &options.config_path {
        Some(path) => Ok(RecorderConfig::load_from_file(path)?),
        None => Ok(RecorderConfig::default()),
    }
}

fn cmd_resolve(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_options(args)?;
    let Some(address) = options.positional.first() else {
        eprintln!("Usage: ipcam-recorder resolve <address>");
        std::process::exit(1);
    };
    let config = load_config(&options)?;

    let fetcher = HttpFetcher::new(config.network.request_timeout())?;
    let resolver = StreamResolver::new(fetcher, config.network.default_scheme.clone());
    match resolver.resolve(address) {
        Ok(url) => {
            println!("{}", url);
            Ok(())
        }
        Err(e) => {
            log::error!("Error extracting stream URL: {}", e.detail());
            Err(e.into())
        }
    }
}

fn cmd_record(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_options(args)?;
    if options.positional.len() < 2 {
        eprintln!("Usage: ipcam-recorder record <address> <folder> [--config <path>] [--json]");
        std::process::exit(1);
    }
    let address = &options.positional[0];
    let folder = &options.positional[1];
    let config = load_config(&options)?;

    let mut session = RecorderSession::with_defaults(config)?;
    let started = session.start(address, folder)?;
    if !options.json {
        println!(
            "Recording {} -> {} ({}x{} @ {} fps). Press Ctrl-C to stop.",
            started.stream_url,
            started.output_path.display(),
            started.width,
            started.height,
            started.fps
        );
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let completion = session.completion().ok_or("Recording is not running")?;
    crossbeam_channel::select! {
        recv(stop_rx) -> _ => log::info!("Stop requested"),
        recv(completion) -> reason => {
            if let Ok(reason) = reason {
                log::info!("Capture ended on its own: {:?}", reason);
            }
        }
    }

    let summary = session.stop()?;
    if !summary.stop_reason.is_requested() {
        log::warn!("Recording ended before stop was requested: {:?}", summary.stop_reason);
    }
    if options.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "Saved {} frames ({:.1}s, {} bytes) to {}",
            summary.frames_written,
            summary.duration_secs,
            summary.bytes_written,
            summary.output_path.display()
        );
    }

    Ok(())
}
