use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use library::events::TracingEvents;
use library::report::StdoutConsole;
use library::Options;
use metadata::Id3TagIo;
use tracing::error;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tagtidy <root> [--dry-run] [--json] [--ext EXT] \
[--artist REGEX] [--album REGEX] [--track REGEX] [--state-dir DIR]";

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (options, json) = match parse_args() {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("{}", USAGE);
            return ExitCode::from(1);
        }
    };

    let cancel = AtomicBool::new(false);
    match library::run(&options, &Id3TagIo, &StdoutConsole, &TracingEvents, &cancel) {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(rendered) => println!("{}", rendered),
                    Err(err) => error!("cannot render report: {}", err),
                }
            }
            ExitCode::from(report.exit.code() as u8)
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_class().code() as u8)
        }
    }
}

fn parse_args() -> Result<(Options, bool), String> {
    let mut root: Option<PathBuf> = None;
    let mut dry_run = false;
    let mut json = false;
    let mut extension: Option<String> = None;
    let mut artist: Option<String> = None;
    let mut album: Option<String> = None;
    let mut track: Option<String> = None;
    let mut state_dir: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--json" => json = true,
            "--ext" => extension = Some(required_value(&arg, args.next())?),
            "--artist" => artist = Some(required_value(&arg, args.next())?),
            "--album" => album = Some(required_value(&arg, args.next())?),
            "--track" => track = Some(required_value(&arg, args.next())?),
            "--state-dir" => state_dir = Some(PathBuf::from(required_value(&arg, args.next())?)),
            other if other.starts_with('-') => {
                return Err(format!("unknown flag: {}", other));
            }
            _ => {
                if root.is_some() {
                    return Err(format!("unexpected extra argument: {}", arg));
                }
                root = Some(PathBuf::from(arg));
            }
        }
    }

    let root = root
        .or_else(|| env::var("TAGTIDY_ROOT").ok().map(PathBuf::from))
        .ok_or_else(|| "library root not given and TAGTIDY_ROOT not set".to_string())?;

    let mut options = Options::new(root);
    options.dry_run = dry_run;
    if let Some(extension) = extension {
        options.extension = extension.trim_start_matches('.').to_string();
    }
    if let Some(artist) = artist {
        options.artist_filter = artist;
    }
    if let Some(album) = album {
        options.album_filter = album;
    }
    if let Some(track) = track {
        options.track_filter = track;
    }
    options.state_dir = state_dir;

    Ok((options, json))
}

fn required_value(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("{} needs a value", flag))
}
