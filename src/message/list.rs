//! Homogeneous ordered lists.

use std::fmt;

use serde_json::Value;

use super::{CoreMessage, ErrorValue, FunctionResult, Gallery, MessageError, Remark};

/// Runtime kind of a list element, used to keep lists homogeneous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Remark,
    Error,
    List,
    Function,
    Gallery,
    /// Raw JSON string
    String,
    /// Raw JSON number
    Number,
    /// Raw JSON boolean
    Bool,
    /// Raw JSON null
    Null,
    /// Raw JSON array
    Array,
    /// Raw JSON object
    Object,
}

impl ItemKind {
    /// Kind of a raw JSON value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => ItemKind::Null,
            Value::Bool(_) => ItemKind::Bool,
            Value::Number(_) => ItemKind::Number,
            Value::String(_) => ItemKind::String,
            Value::Array(_) => ItemKind::Array,
            Value::Object(_) => ItemKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Remark => "Remark",
            ItemKind::Error => "Error",
            ItemKind::List => "List",
            ItemKind::Function => "Function",
            ItemKind::Gallery => "Gallery",
            ItemKind::String => "string",
            ItemKind::Number => "number",
            ItemKind::Bool => "bool",
            ItemKind::Null => "null",
            ItemKind::Array => "array",
            ItemKind::Object => "object",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One list element: either a message or a raw JSON value.
#[derive(Debug, Clone)]
pub enum ListItem {
    Message(CoreMessage),
    Raw(Value),
}

impl ListItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            ListItem::Message(message) => message.kind(),
            ListItem::Raw(value) => ItemKind::of_value(value),
        }
    }

    fn reduce(&self) -> Result<Value, MessageError> {
        match self {
            ListItem::Message(message) => message.reduce(),
            ListItem::Raw(value) => Ok(value.clone()),
        }
    }
}

impl ListItem {
    /// Wrap a raw JSON value (string, number, ...).
    pub fn raw(value: impl Into<Value>) -> Self {
        ListItem::Raw(value.into())
    }
}

impl From<CoreMessage> for ListItem {
    fn from(message: CoreMessage) -> Self {
        ListItem::Message(message)
    }
}

macro_rules! list_item_from_payload {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ListItem {
                fn from(value: $ty) -> Self {
                    ListItem::Message(CoreMessage::from(value))
                }
            }
        )*
    };
}

list_item_from_payload!(Remark, ErrorValue, ListValue, FunctionResult, Gallery);

/// An ordered list whose items all share one declared [`ItemKind`].
#[derive(Debug, Clone)]
pub struct ListValue {
    key: String,
    kind: ItemKind,
    items: Vec<ListItem>,
}

impl ListValue {
    pub fn new(key: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            key: key.into(),
            kind,
            items: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    /// Append an item, rejecting anything not of the declared kind.
    pub fn append(&mut self, item: impl Into<ListItem>) -> Result<(), MessageError> {
        let item = item.into();
        let found = item.kind();
        if found != self.kind {
            return Err(MessageError::TypeMismatch {
                key: self.key.clone(),
                expected: self.kind,
                found,
            });
        }
        self.items.push(item);
        Ok(())
    }

    pub fn reduce(&self) -> Result<Value, MessageError> {
        self.items
            .iter()
            .map(ListItem::reduce)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_append_preserves_order() {
        let mut list = ListValue::new("remarks", ItemKind::Remark);
        for text in ["c", "a", "b"] {
            list.append(Remark::new(text)).unwrap();
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.reduce().unwrap(), json!(["c", "a", "b"]));
    }

    #[test]
    fn test_append_rejects_other_kind() {
        let mut list = ListValue::new("remarks", ItemKind::Remark);
        let err = list.append(ErrorValue::new(1, "nope")).unwrap_err();
        assert_eq!(
            err,
            MessageError::TypeMismatch {
                key: "remarks".to_string(),
                expected: ItemKind::Remark,
                found: ItemKind::Error,
            }
        );
        assert!(list.is_empty());

        let err = list.append(ListItem::raw("plain string")).unwrap_err();
        assert!(matches!(err, MessageError::TypeMismatch { found: ItemKind::String, .. }));
    }

    #[test]
    fn test_raw_values() {
        let mut list = ListValue::new("paths", ItemKind::String);
        list.append(ListItem::raw("/a")).unwrap();
        list.append(ListItem::raw("/b")).unwrap();
        assert!(list.append(ListItem::raw(3)).is_err());
        assert_eq!(list.reduce().unwrap(), json!(["/a", "/b"]));
    }

    #[test]
    fn test_items_reduce_with_their_errors() {
        let mut list = ListValue::new("remarks", ItemKind::Remark);
        list.append(CoreMessage::remark("ok")).unwrap();
        list.append(CoreMessage::remark("bad").with_error(ErrorValue::new(9, "why")))
            .unwrap();
        assert_eq!(
            list.reduce().unwrap(),
            json!(["ok", {"msg": "bad", "error": {"code": 9, "msg": "why"}}])
        );
    }

    #[test]
    fn test_reduce_propagates_item_violation() {
        let mut list = ListValue::new("results", ItemKind::Function);
        list.append(FunctionResult::new("scan_gallery").unwrap()).unwrap();
        assert!(matches!(
            list.reduce(),
            Err(MessageError::IncompleteValue { .. })
        ));

        let mut galleries = ListValue::new("galleries", ItemKind::Gallery);
        galleries.append(Gallery::unlinked()).unwrap();
        assert_eq!(galleries.reduce(), Err(MessageError::UnlinkedReference));
    }

    #[test]
    fn test_empty_list() {
        let list = ListValue::new("galleries", ItemKind::Gallery);
        assert_eq!(list.reduce().unwrap(), json!([]));
    }
}
