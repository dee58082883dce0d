//! Message model for server results.
//!
//! Every value the server hands back to a client is a [`CoreMessage`]: one of a
//! closed set of payloads plus at most one attached [`ErrorValue`]. A message
//! is built with `&mut` setters and then reduced (through a shared borrow) to
//! a plain `serde_json::Value`, which the envelope codec wraps and encodes.
//!
//! # Reduced shapes
//!
//! ```text
//! Remark          "text"
//! ErrorValue      {"code": 404, "msg": "text"}
//! ListValue       [<item>, <item>, ...]
//! FunctionResult  {"fname": "fetch_gallery", "data": <payload>}
//! Gallery         {"id", "title", "author", "circle", "language", "type",
//!                  "path", "archive_path"}
//! ```
//!
//! An attached error is merged into an object payload under `"error"`. A
//! payload that is not an object is first wrapped under its own key:
//!
//! ```text
//! {"msg": "text", "error": {"code": 404, "msg": "not found"}}
//! ```
//!
//! Building a message wrong (wrong list item kind, missing function data,
//! unlinked gallery) is a [`MessageError`]. These never reach the wire.

mod gallery;
mod list;

use serde_json::{Map, Value};
use thiserror::Error;

pub use gallery::{Gallery, GALLERY_KEYS};
pub use list::{ItemKind, ListItem, ListValue};

/// Key an attached error is merged under.
pub const ERROR_KEY: &str = "error";

/// Key of a remark, both standalone and inside an error.
pub const REMARK_KEY: &str = "msg";

/// Key of a function result.
pub const FUNCTION_KEY: &str = "function";

/// Contract violations raised while building or reducing a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// An item of the wrong kind was appended to a list.
    #[error("List '{key}' holds {expected} items, cannot append {found}")]
    TypeMismatch {
        /// List key
        key: String,
        /// Declared element kind
        expected: ItemKind,
        /// Kind of the rejected item
        found: ItemKind,
    },

    /// A function result was reduced before its data was set.
    #[error("Function '{name}' has no data set")]
    IncompleteValue {
        /// Function name
        name: String,
    },

    /// A gallery was reduced without a linked database record.
    #[error("Gallery has no linked database record")]
    UnlinkedReference,

    /// An attached error would overwrite a key of the payload.
    #[error("Key '{0}' is already present in the reduced payload")]
    KeyCollision(String),

    /// Function results need a name.
    #[error("Function name must not be empty")]
    EmptyFunctionName,
}

/// Well-known error codes for business errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request data did not name a function.
    InvalidRequest,
    /// The named function does not exist.
    UnknownFunction,
    /// The function exists but this server cannot perform it.
    Unsupported,
    /// No gallery matched the request.
    GalleryNotFound,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::GalleryNotFound => 404,
            ErrorCode::UnknownFunction => 405,
            ErrorCode::Unsupported => 501,
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// An arbitrary remark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remark {
    text: String,
}

impl Remark {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reduce(&self) -> Value {
        Value::String(self.text.clone())
    }
}

/// A business error: a code plus a remark describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    code: i64,
    remark: Remark,
}

impl ErrorValue {
    pub fn new(code: impl Into<i64>, remark: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            remark: Remark::new(remark),
        }
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn remark(&self) -> &Remark {
        &self.remark
    }

    pub fn reduce(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::from(self.code));
        map.insert(REMARK_KEY.to_string(), self.remark.reduce());
        Value::Object(map)
    }
}

/// A named function together with the value it produced.
#[derive(Debug, Clone)]
pub struct FunctionResult {
    name: String,
    data: Option<Box<CoreMessage>>,
}

impl FunctionResult {
    /// Create a result for `name` with no data yet.
    pub fn new(name: impl Into<String>) -> Result<Self, MessageError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MessageError::EmptyFunctionName);
        }
        Ok(Self { name, data: None })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set (or replace) the function's data.
    pub fn set_data(&mut self, data: impl Into<CoreMessage>) {
        self.data = Some(Box::new(data.into()));
    }

    pub fn with_data(mut self, data: impl Into<CoreMessage>) -> Self {
        self.set_data(data);
        self
    }

    pub fn data(&self) -> Option<&CoreMessage> {
        self.data.as_deref()
    }

    pub fn reduce(&self) -> Result<Value, MessageError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| MessageError::IncompleteValue {
                name: self.name.clone(),
            })?;

        let mut map = Map::new();
        map.insert("fname".to_string(), Value::String(self.name.clone()));
        map.insert("data".to_string(), data.reduce()?);
        Ok(Value::Object(map))
    }
}

/// The payload variants a [`CoreMessage`] can carry.
#[derive(Debug, Clone)]
pub enum Payload {
    Remark(Remark),
    Error(ErrorValue),
    List(ListValue),
    Function(FunctionResult),
    Gallery(Gallery),
}

impl Payload {
    fn reduce(&self) -> Result<Value, MessageError> {
        match self {
            Payload::Remark(remark) => Ok(remark.reduce()),
            Payload::Error(error) => Ok(error.reduce()),
            Payload::List(list) => list.reduce(),
            Payload::Function(function) => function.reduce(),
            Payload::Gallery(gallery) => gallery.reduce(),
        }
    }
}

/// A server result: one payload plus an optional attached error.
#[derive(Debug, Clone)]
pub struct CoreMessage {
    payload: Payload,
    error: Option<ErrorValue>,
}

impl CoreMessage {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            error: None,
        }
    }

    /// Shorthand for a remark message.
    pub fn remark(text: impl Into<String>) -> Self {
        Remark::new(text).into()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Key identifying the variant (`msg`, `error`, `function`, `gallery`,
    /// or the list's own key).
    pub fn key(&self) -> &str {
        match &self.payload {
            Payload::Remark(_) => REMARK_KEY,
            Payload::Error(_) => ERROR_KEY,
            Payload::List(list) => list.key(),
            Payload::Function(_) => FUNCTION_KEY,
            Payload::Gallery(_) => gallery::GALLERY_KEY,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match &self.payload {
            Payload::Remark(_) => ItemKind::Remark,
            Payload::Error(_) => ItemKind::Error,
            Payload::List(_) => ItemKind::List,
            Payload::Function(_) => ItemKind::Function,
            Payload::Gallery(_) => ItemKind::Gallery,
        }
    }

    /// Attach an error. A previously attached error is replaced.
    pub fn attach_error(&mut self, error: ErrorValue) {
        self.error = Some(error);
    }

    pub fn with_error(mut self, error: ErrorValue) -> Self {
        self.attach_error(error);
        self
    }

    pub fn error(&self) -> Option<&ErrorValue> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<ErrorValue> {
        self.error.take()
    }

    /// Reduce to a plain JSON value, merging the attached error if any.
    pub fn reduce(&self) -> Result<Value, MessageError> {
        let base = self.payload.reduce()?;
        let Some(error) = &self.error else {
            return Ok(base);
        };

        let mut map = match base {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(self.key().to_string(), other);
                map
            }
        };

        if map.contains_key(ERROR_KEY) {
            return Err(MessageError::KeyCollision(ERROR_KEY.to_string()));
        }
        map.insert(ERROR_KEY.to_string(), error.reduce());
        Ok(Value::Object(map))
    }
}

impl From<Payload> for CoreMessage {
    fn from(payload: Payload) -> Self {
        Self::new(payload)
    }
}

impl From<Remark> for CoreMessage {
    fn from(remark: Remark) -> Self {
        Self::new(Payload::Remark(remark))
    }
}

impl From<ErrorValue> for CoreMessage {
    fn from(error: ErrorValue) -> Self {
        Self::new(Payload::Error(error))
    }
}

impl From<ListValue> for CoreMessage {
    fn from(list: ListValue) -> Self {
        Self::new(Payload::List(list))
    }
}

impl From<FunctionResult> for CoreMessage {
    fn from(function: FunctionResult) -> Self {
        Self::new(Payload::Function(function))
    }
}

impl From<Gallery> for CoreMessage {
    fn from(gallery: Gallery) -> Self {
        Self::new(Payload::Gallery(gallery))
    }
}
