use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Protocol name announced in `ready`
pub const PROTOCOL_NAME: &str = "ion";

/// Every `type` string the codec understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Describe,
    Ready,
    Start,
    Stop,
    Error,
    SatelliteHello,
    SatelliteState,
    WakeDetected,
    WakeReset,
    VadStart,
    VadStop,
    AsrStart,
    AsrStop,
    AsrPartial,
    AsrResult,
    AsrError,
    TtsStart,
    TtsReady,
    TtsDone,
    TtsStop,
    TtsError,
}

impl EventType {
    pub const ALL: [EventType; 21] = [
        EventType::Describe,
        EventType::Ready,
        EventType::Start,
        EventType::Stop,
        EventType::Error,
        EventType::SatelliteHello,
        EventType::SatelliteState,
        EventType::WakeDetected,
        EventType::WakeReset,
        EventType::VadStart,
        EventType::VadStop,
        EventType::AsrStart,
        EventType::AsrStop,
        EventType::AsrPartial,
        EventType::AsrResult,
        EventType::AsrError,
        EventType::TtsStart,
        EventType::TtsReady,
        EventType::TtsDone,
        EventType::TtsStop,
        EventType::TtsError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Describe => "describe",
            EventType::Ready => "ready",
            EventType::Start => "start",
            EventType::Stop => "stop",
            EventType::Error => "error",
            EventType::SatelliteHello => "satellite.hello",
            EventType::SatelliteState => "satellite.state",
            EventType::WakeDetected => "wake.detected",
            EventType::WakeReset => "wake.reset",
            EventType::VadStart => "vad.start",
            EventType::VadStop => "vad.stop",
            EventType::AsrStart => "asr.start",
            EventType::AsrStop => "asr.stop",
            EventType::AsrPartial => "asr.partial",
            EventType::AsrResult => "asr.result",
            EventType::AsrError => "asr.error",
            EventType::TtsStart => "tts.start",
            EventType::TtsReady => "tts.ready",
            EventType::TtsDone => "tts.done",
            EventType::TtsStop => "tts.stop",
            EventType::TtsError => "tts.error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON control event carried in a control frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    #[serde(rename = "describe")]
    Describe,

    #[serde(rename = "ready")]
    Ready {
        protocol: String,
        sample_rate: u32,
        channels: u16,
        format: String,
    },

    #[serde(rename = "start")]
    Start,

    #[serde(rename = "stop")]
    Stop,

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "satellite.hello")]
    SatelliteHello {
        name: String,
        sample_rate: u32,
        channels: u16,
        format: String,
        #[serde(default, skip_serializing_if = "is_false")]
        wake: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        vad: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        asr: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        tts: bool,
    },

    #[serde(rename = "satellite.state")]
    SatelliteState { state: String },

    #[serde(rename = "wake.detected")]
    WakeDetected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    #[serde(rename = "wake.reset")]
    WakeReset,

    #[serde(rename = "vad.start")]
    VadStart,

    #[serde(rename = "vad.stop")]
    VadStop,

    #[serde(rename = "asr.start")]
    AsrStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },

    #[serde(rename = "asr.stop")]
    AsrStop,

    #[serde(rename = "asr.partial")]
    AsrPartial { text: String },

    #[serde(rename = "asr.result")]
    AsrResult { text: String },

    #[serde(rename = "asr.error")]
    AsrError { message: String },

    #[serde(rename = "tts.start")]
    TtsStart {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },

    #[serde(rename = "tts.ready")]
    TtsReady,

    #[serde(rename = "tts.done")]
    TtsDone,

    #[serde(rename = "tts.stop")]
    TtsStop,

    #[serde(rename = "tts.error")]
    TtsError { message: String },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ControlEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ControlEvent::Describe => EventType::Describe,
            ControlEvent::Ready { .. } => EventType::Ready,
            ControlEvent::Start => EventType::Start,
            ControlEvent::Stop => EventType::Stop,
            ControlEvent::Error { .. } => EventType::Error,
            ControlEvent::SatelliteHello { .. } => EventType::SatelliteHello,
            ControlEvent::SatelliteState { .. } => EventType::SatelliteState,
            ControlEvent::WakeDetected { .. } => EventType::WakeDetected,
            ControlEvent::WakeReset => EventType::WakeReset,
            ControlEvent::VadStart => EventType::VadStart,
            ControlEvent::VadStop => EventType::VadStop,
            ControlEvent::AsrStart { .. } => EventType::AsrStart,
            ControlEvent::AsrStop => EventType::AsrStop,
            ControlEvent::AsrPartial { .. } => EventType::AsrPartial,
            ControlEvent::AsrResult { .. } => EventType::AsrResult,
            ControlEvent::AsrError { .. } => EventType::AsrError,
            ControlEvent::TtsStart { .. } => EventType::TtsStart,
            ControlEvent::TtsReady => EventType::TtsReady,
            ControlEvent::TtsDone => EventType::TtsDone,
            ControlEvent::TtsStop => EventType::TtsStop,
            ControlEvent::TtsError { .. } => EventType::TtsError,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("control payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("control payload has no string `type` field")]
    MissingType,

    #[error("malformed `{event_type}` event: {source}")]
    Shape {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a control payload.
///
/// The `type` field is inspected first; payloads naming a type this codec
/// does not know decode to `Ok(None)` so newer peers can add events freely.
pub fn decode(payload: &[u8]) -> Result<Option<ControlEvent>, DecodeError> {
    let value: Value = serde_json::from_slice(payload).map_err(DecodeError::Json)?;

    let name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    let Some(event_type) = EventType::parse(name) else {
        debug!("Ignoring unrecognized event type: {}", name);
        return Ok(None);
    };

    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| DecodeError::Shape { event_type, source })
}

pub fn encode(event: &ControlEvent) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names_parse_back() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("asr.bogus"), None);
    }

    #[test]
    fn test_unit_variant_encoding() {
        let json = encode(&ControlEvent::Describe).unwrap();
        assert_eq!(json, br#"{"type":"describe"}"#);
    }

    #[test]
    fn test_false_capabilities_are_omitted() {
        let hello = ControlEvent::SatelliteHello {
            name: "kitchen".to_string(),
            sample_rate: 16000,
            channels: 1,
            format: "s16le".to_string(),
            wake: false,
            vad: false,
            asr: true,
            tts: true,
        };
        let json = String::from_utf8(encode(&hello).unwrap()).unwrap();
        assert!(json.contains("\"asr\":true"));
        assert!(!json.contains("wake"));
        assert!(!json.contains("vad"));
    }
}
