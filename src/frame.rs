//! Wire frame exchanged with the directory service.
//!
//! Every message is a single JSON object carrying an event tag and, depending
//! on the event, a payload, a correlation reference, a status and an error
//! code.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::correlation::{CorrelatableFrame, CorrelationKey};

/// One JSON message on the wire.
///
/// # Examples
///
/// ```
/// use grapevine::frame::Frame;
/// use serde_json::json;
///
/// let frame = Frame::new("players/sign-in").with_payload(json!({"name": "Alice"}));
/// let text = frame.encode().expect("encode frame");
/// assert_eq!(Frame::decode(&text).expect("decode frame"), frame);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    /// Create a frame with only an event tag.
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach a correlation reference.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Serialize the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> { serde_json::to_string(self) }

    /// Parse a frame from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if `text` is not a frame object.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(text) }

    /// Deserialize the payload into `T`. A missing payload is treated as
    /// `null`.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload does not match `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.payload {
            Some(payload) => T::deserialize(payload),
            None => T::deserialize(&Value::Null),
        }
    }

    /// Whether the frame reports a failed request.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status.as_deref() == Some("failure")
    }

    /// Key used to pair this frame with a pending request.
    #[must_use]
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.event.clone(), self.reference.clone())
    }
}

impl CorrelatableFrame for Frame {
    fn correlation_id(&self) -> Option<&str> { self.reference.as_deref() }

    fn set_correlation_id(&mut self, correlation_id: Option<String>) {
        self.reference = correlation_id;
    }
}
