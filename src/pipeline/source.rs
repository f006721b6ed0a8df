//! Container frame sources backed by the webrtc IVF and Ogg readers

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use log::debug;
use thiserror::Error;
use webrtc::media::io::ivf_reader::IVFReader;
use webrtc::media::io::ogg_reader::OggReader;

use super::clock::OPUS_GRANULE_RATE;
use super::types::{StreamTiming, VideoCodec};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed container {path}: {reason}")]
    Container { path: PathBuf, reason: String },
    #[error("unable to handle FourCC {0}")]
    UnsupportedCodec(String),
    #[error("time-base yields a zero pacing interval")]
    InvalidTimeBase,
}

/// One unit read from a container
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub data: Bytes,
    /// Granule position of the page, only set by page based sources
    pub granule_position: Option<u64>,
}

/// An open container yielding units in file order
pub trait FrameSource: Send {
    fn timing(&self) -> StreamTiming;

    /// Next unit, or `Ok(None)` once the container is exhausted.
    fn next_unit(&mut self) -> Result<Option<SourceUnit>, SourceError>;
}

/// Opens (and re-opens) a container from its beginning
pub trait SourceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, SourceError>;

    fn describe(&self) -> String;
}

/// Reader wrapper remembering whether the underlying file hit its end,
/// so that a parse failure at end of file can be told apart from corruption.
struct EofProbe<R> {
    inner: R,
    hit_eof: Arc<AtomicBool>,
}

impl<R: Read> Read for EofProbe<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.hit_eof.store(true, Ordering::Relaxed);
        }
        Ok(n)
    }
}

fn open_probed(path: &Path) -> Result<(EofProbe<BufReader<File>>, Arc<AtomicBool>), SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let hit_eof = Arc::new(AtomicBool::new(false));
    let probe = EofProbe {
        inner: BufReader::new(file),
        hit_eof: Arc::clone(&hit_eof),
    };
    Ok((probe, hit_eof))
}

fn container_error(path: &Path, err: impl std::fmt::Display) -> SourceError {
    SourceError::Container {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

pub struct IvfSource {
    reader: IVFReader<EofProbe<BufReader<File>>>,
    hit_eof: Arc<AtomicBool>,
    timing: StreamTiming,
    codec: VideoCodec,
    path: PathBuf,
}

impl IvfSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let (probe, hit_eof) = open_probed(path)?;
        let (reader, header) = IVFReader::new(probe).map_err(|e| container_error(path, e))?;
        Ok(Self {
            reader,
            hit_eof,
            timing: StreamTiming::TimeBase {
                numerator: header.timebase_numerator,
                denominator: header.timebase_denominator,
            },
            codec: VideoCodec::from_four_cc(&header.four_cc),
            path: path.to_path_buf(),
        })
    }

    pub fn codec(&self) -> &VideoCodec {
        &self.codec
    }
}

impl FrameSource for IvfSource {
    fn timing(&self) -> StreamTiming {
        self.timing
    }

    fn next_unit(&mut self) -> Result<Option<SourceUnit>, SourceError> {
        match self.reader.parse_next_frame() {
            Ok((frame, _)) => Ok(Some(SourceUnit {
                data: frame.freeze(),
                granule_position: None,
            })),
            Err(_) if self.hit_eof.load(Ordering::Relaxed) => Ok(None),
            Err(e) => Err(container_error(&self.path, e)),
        }
    }
}

pub struct OggSource {
    reader: OggReader<EofProbe<BufReader<File>>>,
    hit_eof: Arc<AtomicBool>,
    path: PathBuf,
}

impl OggSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let (probe, hit_eof) = open_probed(path)?;
        let (reader, header) = OggReader::new(probe, true).map_err(|e| container_error(path, e))?;
        // the input rate is informational, granules stay on the 48 kHz clock
        debug!(
            "{}: {} channel(s), input rate {} Hz",
            path.display(),
            header.channels,
            header.sample_rate
        );
        Ok(Self {
            reader,
            hit_eof,
            path: path.to_path_buf(),
        })
    }
}

impl FrameSource for OggSource {
    fn timing(&self) -> StreamTiming {
        StreamTiming::SampleRate(OPUS_GRANULE_RATE)
    }

    fn next_unit(&mut self) -> Result<Option<SourceUnit>, SourceError> {
        match self.reader.parse_next_page() {
            Ok((page, header)) => Ok(Some(SourceUnit {
                data: page.freeze(),
                granule_position: Some(header.granule_position),
            })),
            Err(_) if self.hit_eof.load(Ordering::Relaxed) => Ok(None),
            Err(e) => Err(container_error(&self.path, e)),
        }
    }
}

pub struct IvfOpener {
    pub path: PathBuf,
}

impl SourceOpener for IvfOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(IvfSource::open(&self.path)?))
    }

    fn describe(&self) -> String {
        format!("ivf:{}", self.path.display())
    }
}

pub struct OggOpener {
    pub path: PathBuf,
}

impl SourceOpener for OggOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(OggSource::open(&self.path)?))
    }

    fn describe(&self) -> String {
        format!("ogg:{}", self.path.display())
    }
}

/// Reads the IVF header once to select the video track codec.
pub fn probe_video_codec(path: &Path) -> Result<VideoCodec, SourceError> {
    let source = IvfSource::open(path)?;
    match source.codec() {
        VideoCodec::Unsupported(tag) => Err(SourceError::UnsupportedCodec(tag.clone())),
        codec => Ok(codec.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::page_duration;
    use std::io::Write;
    use std::time::Duration;
    use webrtc::media::io::Writer;
    use webrtc::media::io::ogg_writer::OggWriter;
    use webrtc::rtp::header::Header;
    use webrtc::rtp::packet::Packet;

    /// Minimal IVF file: 32 byte header followed by 12 byte frame headers.
    fn ivf_bytes(four_cc: &[u8; 4], numerator: u32, denominator: u32, frames: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"DKIF");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(four_cc);
        out.extend_from_slice(&640u16.to_le_bytes());
        out.extend_from_slice(&480u16.to_le_bytes());
        out.extend_from_slice(&denominator.to_le_bytes());
        out.extend_from_slice(&numerator.to_le_bytes());
        out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for (i, frame) in frames.iter().enumerate() {
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(i as u64).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_ivf_reads_frames_then_eos() {
        let file = write_temp(&ivf_bytes(b"VP80", 1, 30, &[b"one", b"two", b"three"]));
        let mut source = IvfSource::open(file.path()).unwrap();

        assert_eq!(
            source.timing(),
            StreamTiming::TimeBase {
                numerator: 1,
                denominator: 30
            }
        );
        assert_eq!(source.codec(), &VideoCodec::Vp8);

        let mut seen = Vec::new();
        while let Some(unit) = source.next_unit().unwrap() {
            assert!(unit.granule_position.is_none());
            seen.push(unit.data);
        }
        assert_eq!(seen, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two"), Bytes::from_static(b"three")]);
        // stays at end
        assert!(source.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_ivf_opener_restarts_from_beginning() {
        let file = write_temp(&ivf_bytes(b"VP90", 1, 25, &[b"a", b"b"]));
        let opener = IvfOpener {
            path: file.path().to_path_buf(),
        };

        for _ in 0..2 {
            let mut source = opener.open().unwrap();
            assert_eq!(source.next_unit().unwrap().unwrap().data, Bytes::from_static(b"a"));
        }
    }

    #[test]
    fn test_probe_rejects_unknown_four_cc() {
        let file = write_temp(&ivf_bytes(b"H264", 1, 30, &[b"x"]));
        match probe_video_codec(file.path()) {
            Err(SourceError::UnsupportedCodec(tag)) => assert_eq!(tag, "H264"),
            other => panic!("unexpected {other:?}"),
        }

        let file = write_temp(&ivf_bytes(b"AV01", 1, 30, &[b"x"]));
        assert_eq!(probe_video_codec(file.path()).unwrap(), VideoCodec::Av1);
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let res = IvfSource::open(Path::new("/nonexistent/definitely/missing.ivf"));
        assert!(matches!(res, Err(SourceError::Open { .. })));
    }

    #[test]
    fn test_bad_signature_is_container_error() {
        let mut bytes = ivf_bytes(b"VP80", 1, 30, &[b"x"]);
        bytes[..4].copy_from_slice(b"RIFF");
        let file = write_temp(&bytes);
        assert!(matches!(IvfSource::open(file.path()), Err(SourceError::Container { .. })));
    }

    /// Ogg Opus file with one page per packet, packets 960 samples apart
    fn ogg_file(input_rate: u32, packets: &[&[u8]]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = OggWriter::new(file.reopen().unwrap(), input_rate, 2).unwrap();
        for (i, payload) in packets.iter().enumerate() {
            writer
                .write_rtp(&Packet {
                    header: Header {
                        timestamp: 960 * i as u32,
                        ..Default::default()
                    },
                    payload: Bytes::copy_from_slice(payload),
                })
                .unwrap();
        }
        writer.close().unwrap();
        file
    }

    fn read_all(source: &mut dyn FrameSource) -> Vec<SourceUnit> {
        let mut units = Vec::new();
        while let Some(unit) = source.next_unit().unwrap() {
            units.push(unit);
        }
        units
    }

    const PACKETS: [&[u8]; 4] = [b"\xf8\x01", b"\xf8\x02", b"\xf8\x03", b"\xf8\x04"];

    #[test]
    fn test_ogg_reads_pages_then_eos() {
        let file = ogg_file(48_000, &PACKETS);
        let mut source = OggSource::open(file.path()).unwrap();
        assert_eq!(source.timing(), StreamTiming::SampleRate(OPUS_GRANULE_RATE));

        let units = read_all(&mut source);
        assert!(units.len() >= PACKETS.len());
        let pages = &units[units.len() - PACKETS.len()..];
        for (page, packet) in pages.iter().zip(PACKETS) {
            assert_eq!(page.data, Bytes::from_static(packet));
        }

        let granules: Vec<u64> = pages.iter().map(|p| p.granule_position.unwrap()).collect();
        for pair in granules.windows(2) {
            assert_eq!(pair[1] - pair[0], 960, "{granules:?}");
        }
        // stays at end
        assert!(source.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_ogg_durations_use_the_granule_clock() {
        // granules are 48 kHz even when the input was recorded at 44.1 kHz
        let file = ogg_file(44_100, &PACKETS);
        let mut source = OggSource::open(file.path()).unwrap();
        let StreamTiming::SampleRate(rate) = source.timing() else {
            panic!("page source reported a time-base");
        };
        assert_eq!(rate, 48_000);

        let units = read_all(&mut source);
        let pages = &units[units.len() - PACKETS.len()..];
        for pair in pages.windows(2) {
            let duration = page_duration(
                pair[1].granule_position.unwrap(),
                pair[0].granule_position.unwrap(),
                rate,
            );
            assert_eq!(duration, Duration::from_millis(20));
        }
    }

    #[test]
    fn test_ogg_opener_restarts_from_beginning() {
        let file = ogg_file(48_000, &PACKETS);
        let opener = OggOpener {
            path: file.path().to_path_buf(),
        };

        let mut first = opener.open().unwrap();
        let first_pass = read_all(first.as_mut());
        let mut second = opener.open().unwrap();
        let second_pass = read_all(second.as_mut());

        assert!(!first_pass.is_empty());
        assert_eq!(first_pass.len(), second_pass.len());
        for (a, b) in first_pass.iter().zip(&second_pass) {
            assert_eq!(a.data, b.data);
            assert_eq!(a.granule_position, b.granule_position);
        }
    }

    #[test]
    fn test_ogg_bad_checksum_is_container_error() {
        let file = ogg_file(48_000, &PACKETS);
        let mut bytes = std::fs::read(file.path()).unwrap();
        // last byte belongs to the payload of the final page
        *bytes.last_mut().unwrap() ^= 0xff;
        let corrupt = write_temp(&bytes);

        let mut source = OggSource::open(corrupt.path()).unwrap();
        let err = loop {
            match source.next_unit() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("corrupt page read as end of stream"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, SourceError::Container { .. }), "{err:?}");
    }
}
