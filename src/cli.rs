//! Command-line argument parsing, clap builder API with a `value_parser`
//! function per argument rather than the derive macros.

use crate::server::ListenAddr;
use clap::{Arg, ArgGroup, Command};
use harness_protocol::SessionMode;
use std::path::PathBuf;

fn validate_mode(value: &str) -> Result<SessionMode, String> {
    match value {
        "passthrough" => Ok(SessionMode::Passthrough),
        "record" => Ok(SessionMode::Record),
        "playback" => Ok(SessionMode::Playback),
        other => Err(format!("unknown mode: {other} (expected passthrough, record, or playback)")),
    }
}

fn validate_port(value: &str) -> Result<u16, String> {
    value.parse::<u16>().map_err(|_| "invalid port number".to_owned())
}

pub struct Args {
    pub listen: ListenAddr,
    pub default_mode: SessionMode,
    pub recording_path: Option<PathBuf>,
    pub recording_dir: Option<PathBuf>,
    pub scenario_name: Option<String>,
}

pub fn parse() -> Args {
    let matches = Command::new("Harness: WebSocket Record/Replay Proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Records and replays WebSocket exchanges between a program under test and a platform")
        .arg(
            Arg::new("mode")
                .help("Default session mode for implicitly-created sessions")
                .short('m')
                .long("mode")
                .value_parser(validate_mode)
                .default_value("passthrough"),
        )
        .arg(
            Arg::new("port")
                .help("TCP port to listen on")
                .short('p')
                .long("port")
                .value_parser(validate_port)
                .default_value("9876"),
        )
        .arg(
            Arg::new("socket")
                .help("UNIX domain socket path to listen on, instead of a TCP port")
                .long("socket")
                .value_name("path"),
        )
        .arg(
            Arg::new("recording_path")
                .help("Path to a single recording file (record or playback mode)")
                .long("recording-path")
                .value_name("path"),
        )
        .arg(
            Arg::new("recording_dir")
                .help("Directory of per-session recordings, named <session>/platform-recording.json")
                .long("recording-dir")
                .value_name("dir"),
        )
        .arg(
            Arg::new("scenario_name")
                .help("Scenario name stamped into newly-recorded files")
                .long("scenario-name")
                .value_name("name"),
        )
        .group(ArgGroup::new("listen").args(["port", "socket"]).multiple(false))
        .get_matches();

    let listen = match matches.get_one::<String>("socket") {
        Some(path) => ListenAddr::Unix(PathBuf::from(path)),
        None => ListenAddr::Tcp(*matches.get_one::<u16>("port").expect("port has a default")),
    };

    Args {
        listen,
        default_mode: *matches.get_one::<SessionMode>("mode").expect("mode has a default"),
        recording_path: matches.get_one::<String>("recording_path").map(PathBuf::from),
        recording_dir: matches.get_one::<String>("recording_dir").map(PathBuf::from),
        scenario_name: matches.get_one::<String>("scenario_name").cloned(),
    }
}
