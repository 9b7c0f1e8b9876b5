//! Utterance types for the ingest stream.
//!
//! Every message entering the system carries an origin tag so that
//! synthesized replies flowing back through the context queue can never be
//! mistaken for fresh human speech by the trigger detector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::ReplyMetadata;

/// Where an utterance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Transcribed human speech.
    #[default]
    Human,
    /// A reply produced by the assistant persona.
    Synthesized,
}

/// A single timestamped utterance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Monotonic sequence number, unique per session, assigned at ingestion.
    pub sequence: u64,

    /// Speaker identifier as reported by diarization.
    pub speaker: String,

    /// Transcribed text.
    pub text: String,

    /// Wall-clock timestamp from the transcription boundary.
    pub timestamp: DateTime<Utc>,

    /// Transcription confidence in `[0.0, 1.0]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Origin tag, defaults to human for raw ingest records.
    #[serde(default)]
    pub origin: Origin,

    /// Present only on synthesized replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReplyMetadata>,
}

const fn default_confidence() -> f64 {
    1.0
}

impl Utterance {
    /// Creates a human-origin utterance.
    pub fn human(sequence: u64, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sequence,
            speaker: speaker.into(),
            text: text.into(),
            timestamp: Utc::now(),
            confidence: default_confidence(),
            origin: Origin::Human,
            metadata: None,
        }
    }

    /// Creates a synthesized reply attributed to the assistant persona.
    pub fn synthesized(
        sequence: u64,
        speaker: impl Into<String>,
        text: impl Into<String>,
        metadata: ReplyMetadata,
    ) -> Self {
        Self {
            sequence,
            speaker: speaker.into(),
            text: text.into(),
            timestamp: Utc::now(),
            confidence: default_confidence(),
            origin: Origin::Synthesized,
            metadata: Some(metadata),
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.origin == Origin::Synthesized
    }
}

/// Raw record read from the transcription boundary (stdin JSONL).
///
/// Sequence numbers are not part of the wire format; the ingest gateway
/// assigns them from the bus counter.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRecord {
    pub speaker: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl IngestRecord {
    /// Converts the record into an utterance with an assigned sequence number.
    pub fn into_utterance(self, sequence: u64) -> Utterance {
        Utterance {
            sequence,
            speaker: self.speaker,
            text: self.text,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            confidence: self.confidence,
            origin: Origin::Human,
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_defaults_to_human() {
        let json = r#"{
            "sequence": 7,
            "speaker": "alice",
            "text": "hello",
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;
        let utterance: Utterance = serde_json::from_str(json).unwrap();
        assert_eq!(utterance.origin, Origin::Human);
        assert!((utterance.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ingest_record_assigns_sequence() {
        let record: IngestRecord =
            serde_json::from_str(r#"{"speaker": "bob", "text": "hi", "confidence": 0.9}"#).unwrap();
        let utterance = record.into_utterance(42);
        assert_eq!(utterance.sequence, 42);
        assert_eq!(utterance.speaker, "bob");
        assert!(!utterance.is_synthesized());
    }

    #[test]
    fn test_synthesized_round_trip_keeps_origin() {
        let utterance = Utterance::synthesized(3, "sage", "a reply", ReplyMetadata::default());
        let json = serde_json::to_string(&utterance).unwrap();
        let back: Utterance = serde_json::from_str(&json).unwrap();
        assert!(back.is_synthesized());
        assert!(back.metadata.is_some());
    }
}
