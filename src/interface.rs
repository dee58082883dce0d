//! Server-side functions callable by clients.
//!
//! A request envelope carries `{"fname": <function>, "data": <params>}`. The
//! [`Interface`] looks up the function, runs it against the gallery source it
//! was constructed with and returns the reply message. Failures a client can
//! cause (unknown function, bad parameters, nothing found) come back as an
//! attached [`ErrorValue`], never as a transport error.

use serde_json::Value;

use crate::db::GallerySource;
use crate::envelope::Envelope;
use crate::ipc::RequestHandler;
use crate::message::{
    CoreMessage, ErrorCode, ErrorValue, FunctionResult, Gallery, ItemKind, ListValue,
    MessageError,
};

/// Request handler exposing the gallery functions.
pub struct Interface<S> {
    source: S,
}

impl<S: GallerySource> Interface<S> {
    /// Create an interface over an explicit gallery session.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Route request data to the function it names.
    pub fn dispatch(&self, data: &Value) -> Result<CoreMessage, MessageError> {
        let Some(fname) = data.get("fname").and_then(Value::as_str) else {
            return Ok(CoreMessage::remark("Request must name a function")
                .with_error(ErrorValue::new(ErrorCode::InvalidRequest, "missing fname")));
        };
        let params = data.get("data").unwrap_or(&Value::Null);

        tracing::debug!("Calling {}", fname);
        match fname {
            "fetch_gallery" => self.fetch_gallery_request(params),
            "add_gallery" => Self::unsupported("add_gallery"),
            "scan_gallery" => Self::unsupported("scan_gallery"),
            other => Ok(CoreMessage::remark(other).with_error(ErrorValue::new(
                ErrorCode::UnknownFunction,
                format!("Unknown function '{}'", other),
            ))),
        }
    }

    /// Fetch galleries starting at `offset`, optionally only those with an
    /// id of at least `from_gallery_id`.
    ///
    /// `GalleryNotFound` is attached only when no gallery has an id of at
    /// least `from_gallery_id`. An offset past the end of the matches gives
    /// an empty list, as it does without an id.
    pub fn fetch_gallery(
        &self,
        offset: usize,
        from_gallery_id: Option<i64>,
    ) -> Result<CoreMessage, MessageError> {
        let mut galleries = ListValue::new("galleries", ItemKind::Gallery);
        for record in self.source.galleries(offset, from_gallery_id) {
            galleries.append(Gallery::new(record))?;
        }

        let missing_id = match from_gallery_id {
            Some(id) if galleries.is_empty() => {
                let exists = offset > 0 && !self.source.galleries(0, Some(id)).is_empty();
                (!exists).then_some(id)
            }
            _ => None,
        };

        let function = FunctionResult::new("fetch_gallery")?.with_data(galleries);
        let mut reply = CoreMessage::from(function);
        if let Some(id) = missing_id {
            reply.attach_error(ErrorValue::new(
                ErrorCode::GalleryNotFound,
                format!("No gallery with id {} or above", id),
            ));
        }
        Ok(reply)
    }

    fn fetch_gallery_request(&self, params: &Value) -> Result<CoreMessage, MessageError> {
        let offset = match params.get("offset") {
            None | Some(Value::Null) => Some(0),
            Some(value) => value.as_u64().and_then(|n| usize::try_from(n).ok()),
        };
        let from_gallery_id = match params.get("from_gallery_id") {
            None | Some(Value::Null) => Some(None),
            Some(value) => value.as_i64().map(Some),
        };

        match (offset, from_gallery_id) {
            (Some(offset), Some(from_gallery_id)) => self.fetch_gallery(offset, from_gallery_id),
            _ => {
                let reply = FunctionResult::new("fetch_gallery")?
                    .with_data(CoreMessage::remark(params.to_string()));
                Ok(CoreMessage::from(reply).with_error(ErrorValue::new(
                    ErrorCode::InvalidRequest,
                    "offset and from_gallery_id must be integers",
                )))
            }
        }
    }

    /// Gallery storage and scanning live outside this server.
    fn unsupported(fname: &str) -> Result<CoreMessage, MessageError> {
        let reply = FunctionResult::new(fname)?.with_data(CoreMessage::remark(""));
        Ok(CoreMessage::from(reply).with_error(ErrorValue::new(
            ErrorCode::Unsupported,
            format!("{} is not available on this server", fname),
        )))
    }
}

impl<S: GallerySource + 'static> RequestHandler for Interface<S> {
    fn handle(&self, request: Envelope<'static>) -> Result<CoreMessage, MessageError> {
        self.dispatch(&request.data)
    }
}
