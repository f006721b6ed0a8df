//! Core types for the pacing pipeline

use bytes::Bytes;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_AV1, MIME_TYPE_VP8, MIME_TYPE_VP9};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Frame-based IVF video
    Video,
    /// Page-based Ogg/Opus audio
    Audio,
}

impl MediaKind {
    /// Track id used when the track is added to the peer connection
    pub fn track_id(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// One unit of encoded media ready for the sink, with its intended playout duration.
#[derive(Clone, PartialEq, Eq)]
pub struct TimedUnit {
    pub data: Bytes,
    pub duration: Duration,
}

impl std::fmt::Debug for TimedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedUnit")
            .field("size", &self.data.len())
            .field("duration", &self.duration)
            .finish()
    }
}

/// Per-stream timing constants read when a container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTiming {
    /// Frame-based containers: duration of one frame as `numerator / denominator` seconds
    TimeBase { numerator: u32, denominator: u32 },
    /// Page-based containers: samples per second of the granule clock
    SampleRate(u32),
}

/// Video codec announced by the IVF FourCC tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoCodec {
    Av1,
    Vp9,
    Vp8,
    Unsupported(String),
}

impl VideoCodec {
    pub fn from_four_cc(four_cc: &[u8; 4]) -> Self {
        match four_cc {
            b"AV01" => VideoCodec::Av1,
            b"VP90" => VideoCodec::Vp9,
            b"VP80" => VideoCodec::Vp8,
            other => VideoCodec::Unsupported(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// Sink mime type, `None` for tags the sink cannot carry.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            VideoCodec::Av1 => Some(MIME_TYPE_AV1),
            VideoCodec::Vp9 => Some(MIME_TYPE_VP9),
            VideoCodec::Vp8 => Some(MIME_TYPE_VP8),
            VideoCodec::Unsupported(_) => None,
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::Av1 => write!(f, "AV1"),
            VideoCodec::Vp9 => write!(f, "VP9"),
            VideoCodec::Vp8 => write!(f, "VP8"),
            VideoCodec::Unsupported(tag) => write!(f, "unsupported ({tag})"),
        }
    }
}

/// What a pacing engine does when its container reaches the end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EosPolicy {
    /// Reopen the container from the start and keep sending
    Loop,
    /// Stop the engine; the process shuts down once it finishes
    Exit,
}

impl std::str::FromStr for EosPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loop" => Ok(EosPolicy::Loop),
            "exit" => Ok(EosPolicy::Exit),
            other => Err(format!("unknown end-of-stream policy `{other}` (loop/exit)")),
        }
    }
}
