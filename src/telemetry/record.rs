//! Latency records carried over the data channel

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Deserializer};

/// One data channel message with its hop timestamps (Unix milliseconds).
///
/// Every integer field is optional on the wire and reads as zero when absent,
/// so zero and "missing" cannot be told apart downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LatencyRecord {
    #[serde(rename = "frameID", default)]
    pub frame_id: i64,
    #[serde(rename = "messageSentTime_client2", default)]
    pub sent_client2: i64,
    #[serde(rename = "messageSentTime_sfu2", default)]
    pub sent_sfu2: i64,
    #[serde(rename = "messageSentTime_sfu1", default)]
    pub sent_sfu1: i64,
    #[serde(rename = "messageSentTime_client1", default)]
    pub sent_client1: i64,
    #[serde(rename = "jitter_sfu2", default)]
    pub jitter_sfu2: i64,
    #[serde(rename = "jitter_sfu1", default)]
    pub jitter_sfu1: i64,
    #[serde(rename = "latency_end_to_end", default)]
    pub latency_end_to_end: i64,
    #[serde(rename = "message_send_rate", default)]
    pub message_send_rate: i64,
    #[serde(default, deserialize_with = "deserialize_payload")]
    pub payload: Bytes,
}

/// Per-hop latencies derived from a stamped record, in milliseconds.
///
/// Plain differences: a hop with an earlier timestamp than its predecessor
/// yields a negative value and is kept as is. Out of range values wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopLatencies {
    pub client2_to_sfu2: i64,
    pub sfu2_to_sfu1: i64,
    pub sfu1_to_client1: i64,
    pub end_to_end: i64,
}

/// Column header of the latency log, in row order
pub const CSV_COLUMNS: [&str; 9] = [
    "FrameID",
    "MessageSentTimeClient2",
    "MessageSentTimeSfu2",
    "MessageSentTimeSfu1",
    "MessageSentTimeClient1",
    "MessageSendRate",
    "JitterSFU2",
    "JitterSFU1",
    "LatencyEndToEnd",
];

impl LatencyRecord {
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Timestamp of the earliest upstream hop that reported one, 0 if none did.
    pub fn origin_time(&self) -> i64 {
        [self.sent_client2, self.sent_sfu2, self.sent_sfu1]
            .into_iter()
            .find(|ts| *ts != 0)
            .unwrap_or(0)
    }

    /// Sets the local receive time and the end-to-end latency derived from it.
    pub fn stamp(&mut self, received_at_ms: i64) {
        self.sent_client1 = received_at_ms;
        self.latency_end_to_end = self.sent_client1.wrapping_sub(self.origin_time());
    }

    pub fn hop_latencies(&self) -> HopLatencies {
        HopLatencies {
            client2_to_sfu2: self.sent_sfu2.wrapping_sub(self.sent_client2),
            sfu2_to_sfu1: self.sent_sfu1.wrapping_sub(self.sent_sfu2),
            sfu1_to_client1: self.sent_client1.wrapping_sub(self.sent_sfu1),
            end_to_end: self.sent_client1.wrapping_sub(self.origin_time()),
        }
    }

    pub fn csv_fields(&self) -> [i64; 9] {
        [
            self.frame_id,
            self.sent_client2,
            self.sent_sfu2,
            self.sent_sfu1,
            self.sent_client1,
            self.message_send_rate,
            self.jitter_sfu2,
            self.jitter_sfu1,
            self.latency_end_to_end,
        ]
    }

    pub fn csv_row(&self) -> String {
        self.csv_fields()
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Encoded(String),
    Raw(Vec<u8>),
}

/// Accepts a base64 string, an array of byte values, or null.
fn deserialize_payload<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawPayload>::deserialize(deserializer)? {
        None => Ok(Bytes::new()),
        Some(RawPayload::Raw(bytes)) => Ok(Bytes::from(bytes)),
        Some(RawPayload::Encoded(text)) => STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_latencies() {
        let mut record = LatencyRecord::from_json(
            br#"{"frameID":7,"messageSentTime_client2":100,"messageSentTime_sfu2":120,"messageSentTime_sfu1":150}"#,
        )
        .unwrap();
        record.stamp(200);

        assert_eq!(record.latency_end_to_end, 100);
        assert_eq!(
            record.hop_latencies(),
            HopLatencies {
                client2_to_sfu2: 20,
                sfu2_to_sfu1: 30,
                sfu1_to_client1: 50,
                end_to_end: 100,
            }
        );
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let mut record = LatencyRecord::from_json(
            br#"{"frameID":3,"messageSentTime_client2":100,"messageSentTime_sfu2":120}"#,
        )
        .unwrap();
        assert_eq!(record.sent_sfu1, 0);
        assert_eq!(record.jitter_sfu1, 0);
        assert!(record.payload.is_empty());

        record.stamp(130);
        // negative hop is recorded as computed
        assert_eq!(record.hop_latencies().sfu2_to_sfu1, -120);
        assert_eq!(record.hop_latencies().sfu1_to_client1, 130);
        assert_eq!(record.csv_row(), "3,100,120,0,130,0,0,0,30");
    }

    #[test]
    fn test_client1_from_sender_is_overwritten() {
        let mut record =
            LatencyRecord::from_json(br#"{"messageSentTime_client2":10,"messageSentTime_client1":999}"#).unwrap();
        record.stamp(40);
        assert_eq!(record.sent_client1, 40);
        assert_eq!(record.latency_end_to_end, 30);
    }

    #[test]
    fn test_origin_falls_back_to_first_reported_hop() {
        let mut record = LatencyRecord::from_json(br#"{"messageSentTime_sfu2":120,"messageSentTime_sfu1":150}"#).unwrap();
        assert_eq!(record.origin_time(), 120);
        record.stamp(200);
        assert_eq!(record.latency_end_to_end, 80);
        // the client2 hop is reported against its zero default
        assert_eq!(record.hop_latencies().client2_to_sfu2, 120);
    }

    #[test]
    fn test_extreme_timestamps_wrap() {
        let mut record = LatencyRecord::from_json(
            br#"{"messageSentTime_client2":-9223372036854775808,"messageSentTime_sfu2":1,"messageSentTime_sfu1":9223372036854775807}"#,
        )
        .unwrap();
        record.stamp(1_700_000_000_000);
        assert_eq!(record.latency_end_to_end, 1_700_000_000_000i64.wrapping_sub(i64::MIN));

        let hops = record.hop_latencies();
        assert_eq!(hops.client2_to_sfu2, 1i64.wrapping_sub(i64::MIN));
        assert_eq!(hops.sfu2_to_sfu1, i64::MAX - 1);
        assert_eq!(hops.sfu1_to_client1, 1_700_000_000_000i64.wrapping_sub(i64::MAX));
        assert_eq!(hops.end_to_end, record.latency_end_to_end);
    }

    #[test]
    fn test_payload_encodings() {
        let record = LatencyRecord::from_json(br#"{"payload":"aGVsbG8="}"#).unwrap();
        assert_eq!(record.payload, Bytes::from_static(b"hello"));

        let record = LatencyRecord::from_json(br#"{"payload":[104,105]}"#).unwrap();
        assert_eq!(record.payload, Bytes::from_static(b"hi"));

        let record = LatencyRecord::from_json(br#"{"payload":null}"#).unwrap();
        assert!(record.payload.is_empty());

        assert!(LatencyRecord::from_json(br#"{"payload":"%%%"}"#).is_err());
    }

    #[test]
    fn test_carried_fields_pass_through() {
        let record = LatencyRecord::from_json(
            br#"{"frameID":1,"jitter_sfu2":4,"jitter_sfu1":5,"message_send_rate":30}"#,
        )
        .unwrap();
        assert_eq!(record.csv_fields(), [1, 0, 0, 0, 0, 30, 4, 5, 0]);
    }

    #[test]
    fn test_malformed_json() {
        assert!(LatencyRecord::from_json(b"not json").is_err());
        assert!(LatencyRecord::from_json(br#"{"frameID":"seven"}"#).is_err());
    }
}
