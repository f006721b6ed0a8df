use crate::pipeline::types::EosPolicy;
use crate::telemetry::QueuePolicy;
use anyhow::{Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_VIDEO_FILE: &str = "output.ivf";
pub const DEFAULT_AUDIO_FILE: &str = "output.ogg";
pub const DEFAULT_OFFER_ENDPOINT: &str = "https://webrtc.hopto.org:8080/offer";
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_LOG_FILE: &str = "datachannel_messages.csv";
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub offer_endpoint: String,
    pub ice_servers: Vec<String>,
    pub metrics_addr: SocketAddr,
    pub log_path: PathBuf,
    pub queue_capacity: usize,
    pub queue_policy: QueuePolicy,
    pub video_eos: EosPolicy,
    pub audio_eos: EosPolicy,
}

impl Config {
    pub fn command() -> Command {
        Command::new(app_name())
            .version(version())
            .author(env!("CARGO_PKG_AUTHORS"))
            .about(env!("CARGO_PKG_DESCRIPTION"))
            .arg(
                Arg::new("video")
                    .long("video")
                    .value_name("FILE")
                    .help("IVF file with AV1, VP9 or VP8 video.")
                    .default_value(DEFAULT_VIDEO_FILE),
            )
            .arg(
                Arg::new("audio")
                    .long("audio")
                    .value_name("FILE")
                    .help("Ogg file with Opus audio.")
                    .default_value(DEFAULT_AUDIO_FILE),
            )
            .arg(
                Arg::new("endpoint")
                    .short('e')
                    .long("endpoint")
                    .value_name("URL")
                    .help("HTTP endpoint the offer is posted to, replying with the answer.")
                    .default_value(DEFAULT_OFFER_ENDPOINT),
            )
            .arg(
                Arg::new("ice-server")
                    .long("ice-server")
                    .value_name("URL")
                    .help("STUN/TURN server, may be repeated.")
                    .action(ArgAction::Append)
                    .default_value(DEFAULT_ICE_SERVER),
            )
            .arg(
                Arg::new("metrics-addr")
                    .long("metrics-addr")
                    .value_name("ADDR")
                    .help("Address of the Prometheus /metrics endpoint.")
                    .value_parser(clap::value_parser!(SocketAddr))
                    .default_value(DEFAULT_METRICS_ADDR),
            )
            .arg(
                Arg::new("log")
                    .short('o')
                    .long("log")
                    .value_name("FILE")
                    .help("CSV file receiving one row per data channel message.")
                    .default_value(DEFAULT_LOG_FILE),
            )
            .arg(
                Arg::new("queue-capacity")
                    .long("queue-capacity")
                    .value_name("N")
                    .help("Records buffered between the message handler and the log writer.")
                    .value_parser(clap::value_parser!(usize))
                    .default_value("100"),
            )
            .arg(
                Arg::new("queue-policy")
                    .long("queue-policy")
                    .value_name("POLICY")
                    .help("Behaviour on a full log queue (block/drop-newest).")
                    .value_parser(|s: &str| s.parse::<QueuePolicy>())
                    .default_value("drop-newest"),
            )
            .arg(
                Arg::new("video-eos")
                    .long("video-eos")
                    .value_name("POLICY")
                    .help("What to do at the end of the video file (loop/exit).")
                    .value_parser(|s: &str| s.parse::<EosPolicy>())
                    .default_value("loop"),
            )
            .arg(
                Arg::new("audio-eos")
                    .long("audio-eos")
                    .value_name("POLICY")
                    .help("What to do at the end of the audio file (loop/exit).")
                    .value_parser(|s: &str| s.parse::<EosPolicy>())
                    .default_value("exit"),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();

        let conf = Config {
            video_path: PathBuf::from(string("video")),
            audio_path: PathBuf::from(string("audio")),
            offer_endpoint: string("endpoint"),
            ice_servers: matches
                .get_many::<String>("ice-server")
                .map(|urls| urls.cloned().collect())
                .unwrap_or_default(),
            metrics_addr: matches
                .get_one::<SocketAddr>("metrics-addr")
                .copied()
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            log_path: PathBuf::from(string("log")),
            queue_capacity: matches
                .get_one::<usize>("queue-capacity")
                .copied()
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            queue_policy: matches
                .get_one::<QueuePolicy>("queue-policy")
                .copied()
                .unwrap_or(QueuePolicy::DropNewest),
            video_eos: matches
                .get_one::<EosPolicy>("video-eos")
                .copied()
                .unwrap_or(EosPolicy::Loop),
            audio_eos: matches
                .get_one::<EosPolicy>("audio-eos")
                .copied()
                .unwrap_or(EosPolicy::Exit),
        };
        conf.validate()?;
        Ok(conf)
    }

    pub fn from_args() -> Result<Self> {
        Self::from_matches(&Self::command().get_matches())
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            bail!("queue capacity must be at least 1");
        }
        if !self.has_video() && !self.has_audio() {
            bail!(
                "Could not find `{}` or `{}`",
                self.audio_path.display(),
                self.video_path.display()
            );
        }
        Ok(())
    }

    pub fn has_video(&self) -> bool {
        self.video_path.is_file()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_path.is_file()
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
