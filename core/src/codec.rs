//! Codecs between in-memory events and byte payloads.
//!
//! Codecs are pure and stateless. The wire format is JSON: a flat object carrying the
//! `event_id`, `event_type` and `timestamp` envelope keys next to the event-specific
//! fields.
//!
//! Each queue carries exactly one event type, so the usual decoder is a
//! [`JsonDeserializer<E>`] bound to that type. Its target is chosen at construction
//! through the type parameter; no runtime type information is involved. When several
//! event types share a queue, a [`DecodeTable`] dispatches on the envelope's
//! `event_type` to one decoder per registered type and produces a common sum type.
//!
//! # Example
//!
//! ```
//! use courier_core::codec::{Deserializer, JsonDeserializer, JsonSerializer, Serializer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Ping {
//!     event_id: String,
//!     event_type: String,
//!     seq: u32,
//! }
//!
//! let ping = Ping { event_id: "e-1".into(), event_type: "ping".into(), seq: 7 };
//! let bytes = JsonSerializer.serialize(&ping).unwrap();
//!
//! let decoder = JsonDeserializer::<Ping>::expecting("ping");
//! assert_eq!(decoder.deserialize(&bytes).unwrap(), ping);
//! ```

use crate::event::EventError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Encodes events of type `E` into byte payloads.
pub trait Serializer<E: ?Sized>: Send + Sync {
    /// Serialize one event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be encoded.
    fn serialize(&self, event: &E) -> Result<Vec<u8>, EventError>;
}

/// Decodes byte payloads into events of type `E`.
pub trait Deserializer<E>: Send + Sync {
    /// Deserialize one payload.
    ///
    /// # Errors
    ///
    /// Returns a decode error ([`EventError::DeserializationError`],
    /// [`EventError::UnknownEventType`] or [`EventError::UnexpectedEventType`]) when the
    /// payload is malformed or does not match the expected shape.
    fn deserialize(&self, bytes: &[u8]) -> Result<E, EventError>;
}

impl<E, D> Deserializer<E> for std::sync::Arc<D>
where
    D: Deserializer<E> + ?Sized,
{
    fn deserialize(&self, bytes: &[u8]) -> Result<E, EventError> {
        (**self).deserialize(bytes)
    }
}

/// Stateless JSON serializer for any `Serialize` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl<E> Serializer<E> for JsonSerializer
where
    E: Serialize + ?Sized,
{
    fn serialize(&self, event: &E) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(event).map_err(|e| EventError::SerializationError(e.to_string()))
    }
}

/// The only envelope key a decoder needs to look at before choosing a target.
#[derive(serde::Deserialize)]
struct EventTypeProbe {
    event_type: String,
}

fn probe_event_type(bytes: &[u8]) -> Result<String, EventError> {
    serde_json::from_slice::<EventTypeProbe>(bytes)
        .map(|probe| probe.event_type)
        .map_err(|e| EventError::DeserializationError(e.to_string()))
}

/// JSON deserializer producing events of type `E`.
///
/// Optionally bound to one event type with [`expecting`](Self::expecting), in which
/// case payloads carrying a different `event_type` are rejected before the body is
/// decoded.
pub struct JsonDeserializer<E> {
    expected: Option<String>,
    _target: PhantomData<fn() -> E>,
}

impl<E> JsonDeserializer<E> {
    /// Create a deserializer that accepts any `event_type`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            expected: None,
            _target: PhantomData,
        }
    }

    /// Create a deserializer that only accepts payloads of `event_type`.
    #[must_use]
    pub fn expecting(event_type: impl Into<String>) -> Self {
        Self {
            expected: Some(event_type.into()),
            _target: PhantomData,
        }
    }

    /// The event type this deserializer is bound to, if any.
    #[must_use]
    pub fn expected_type(&self) -> Option<&str> {
        self.expected.as_deref()
    }
}

impl<E> Default for JsonDeserializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for JsonDeserializer<E> {
    fn clone(&self) -> Self {
        Self {
            expected: self.expected.clone(),
            _target: PhantomData,
        }
    }
}

impl<E> fmt::Debug for JsonDeserializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDeserializer")
            .field("target", &std::any::type_name::<E>())
            .field("expected", &self.expected)
            .finish()
    }
}

impl<E> Deserializer<E> for JsonDeserializer<E>
where
    E: DeserializeOwned,
{
    fn deserialize(&self, bytes: &[u8]) -> Result<E, EventError> {
        if let Some(expected) = &self.expected {
            let found = probe_event_type(bytes)?;
            if &found != expected {
                return Err(EventError::UnexpectedEventType {
                    expected: expected.clone(),
                    found,
                });
            }
        }

        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

type DecodeFn<E> = Box<dyn Fn(&[u8]) -> Result<E, EventError> + Send + Sync>;

/// Tagged-variant decoder: one registered decoder per `event_type`.
///
/// # Example
///
/// ```
/// use courier_core::codec::{DecodeTable, Deserializer};
/// use courier_core::event::EventError;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Opened { event_type: String, id: u32 }
/// #[derive(Debug, Deserialize)]
/// struct Closed { event_type: String, id: u32 }
///
/// #[derive(Debug)]
/// enum DoorEvent { Opened(Opened), Closed(Closed) }
///
/// let table = DecodeTable::new()
///     .register("door.opened", DoorEvent::Opened)
///     .register("door.closed", DoorEvent::Closed);
///
/// let event = table.deserialize(br#"{"event_type":"door.closed","id":1}"#).unwrap();
/// assert!(matches!(event, DoorEvent::Closed(_)));
///
/// let err = table.deserialize(br#"{"event_type":"door.locked","id":1}"#).unwrap_err();
/// assert!(matches!(err, EventError::UnknownEventType(_)));
/// ```
pub struct DecodeTable<E> {
    decoders: HashMap<String, DecodeFn<E>>,
}

impl<E: 'static> DecodeTable<E> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register the decoder for `event_type`.
    ///
    /// Payloads of that type are decoded as `T` and lifted into `E` with `into`.
    /// Registering the same type twice replaces the earlier decoder.
    #[must_use]
    pub fn register<T, F>(mut self, event_type: impl Into<String>, into: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> E + Send + Sync + 'static,
    {
        self.decoders.insert(
            event_type.into(),
            Box::new(move |bytes: &[u8]| {
                serde_json::from_slice::<T>(bytes)
                    .map(&into)
                    .map_err(|e| EventError::DeserializationError(e.to_string()))
            }),
        );
        self
    }

    /// Whether a decoder is registered for `event_type`.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Registered event types, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl<E: 'static> Default for DecodeTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for DecodeTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeTable")
            .field("event_types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E> Deserializer<E> for DecodeTable<E> {
    fn deserialize(&self, bytes: &[u8]) -> Result<E, EventError> {
        let event_type = probe_event_type(bytes)?;
        let decode = self
            .decoders
            .get(&event_type)
            .ok_or(EventError::UnknownEventType(event_type))?;
        decode(bytes)
    }
}
