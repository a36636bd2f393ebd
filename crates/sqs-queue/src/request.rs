//! Request shapes for queue operations.
//!
//! Each client operation takes a typed request ([`PushRequest`],
//! [`ReceiveRequest`], ...). Callers that work with loosely shaped positional
//! arguments (a queue name, a payload, an options object and a trailing
//! handler in any supported combination) go through [`normalize`], which turns
//! them into one [`OperationRequest`] that converts into the typed requests.
//!
//! Options use the provider's field names (`QueueUrl`, `DelaySeconds`,
//! `MaxNumberOfMessages`, ...). Keys an operation does not understand are
//! ignored with a warning.

use crate::error::QueueError;
use crate::message::{AccountId, Attributes, BodyFormat, Payload, QueueUrl, ReceiptHandle};
use crate::service::{ReceiveOptions, SendOptions};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;

/// Most positional arguments any operation accepts
pub const MAX_ARGUMENTS: usize = 4;

// ============================================================================
// Queue targets
// ============================================================================

/// The queue an operation addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTarget {
    /// Logical name, resolved to a URL on every call
    Name {
        name: String,
        owner: Option<AccountId>,
    },
    /// Already resolved URL; no lookup is made
    Url(QueueUrl),
}

impl QueueTarget {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            owner: None,
        }
    }

    pub fn url(url: QueueUrl) -> Self {
        Self::Url(url)
    }

    /// Resolve the name in `owner`'s account instead of the caller's
    pub fn with_owner(self, owner: AccountId) -> Self {
        match self {
            Self::Name { name, .. } => Self::Name {
                name,
                owner: Some(owner),
            },
            url => url,
        }
    }
}

impl fmt::Display for QueueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { name, .. } => write!(f, "{}", name),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

impl From<&str> for QueueTarget {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

impl From<String> for QueueTarget {
    fn from(name: String) -> Self {
        Self::name(name)
    }
}

impl From<QueueUrl> for QueueTarget {
    fn from(url: QueueUrl) -> Self {
        Self::Url(url)
    }
}

// ============================================================================
// Typed requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateQueueRequest {
    pub name: String,
    pub attributes: Attributes,
}

impl CreateQueueRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for CreateQueueRequest {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Attribute lookup; no names means all attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributesRequest {
    pub target: QueueTarget,
    pub attribute_names: Vec<String>,
}

impl AttributesRequest {
    pub fn new(target: impl Into<QueueTarget>) -> Self {
        Self {
            target: target.into(),
            attribute_names: Vec::new(),
        }
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_names = names.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub target: QueueTarget,
    pub payload: Option<Payload>,
    pub options: SendOptions,
}

impl PushRequest {
    pub fn new(target: impl Into<QueueTarget>, payload: impl Into<Payload>) -> Self {
        Self {
            target: target.into(),
            payload: Some(payload.into()),
            options: SendOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_delay(mut self, seconds: u32) -> Self {
        self.options.delay_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub target: QueueTarget,
    pub options: ReceiveOptions,
    pub body_format: BodyFormat,
}

impl ReceiveRequest {
    pub fn new(target: impl Into<QueueTarget>) -> Self {
        Self {
            target: target.into(),
            options: ReceiveOptions::default(),
            body_format: BodyFormat::default(),
        }
    }

    pub fn with_options(mut self, options: ReceiveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.options.max_messages = Some(max);
        self
    }

    pub fn with_wait_time(mut self, seconds: u32) -> Self {
        self.options.wait_time_seconds = Some(seconds);
        self
    }

    pub fn with_body_format(mut self, format: BodyFormat) -> Self {
        self.body_format = format;
        self
    }
}

impl From<&str> for ReceiveRequest {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<QueueUrl> for ReceiveRequest {
    fn from(url: QueueUrl) -> Self {
        Self::new(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMessageRequest {
    pub target: QueueTarget,
    pub receipt_handle: ReceiptHandle,
}

impl DeleteMessageRequest {
    pub fn new(target: impl Into<QueueTarget>, receipt_handle: ReceiptHandle) -> Self {
        Self {
            target: target.into(),
            receipt_handle,
        }
    }
}

// ============================================================================
// Positional argument normalization
// ============================================================================

/// Operations reachable through positional arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    GetQueueUrl,
    GetQueueAttributes,
    CreateQueue,
    DeleteQueue,
    PurgeQueue,
    Push,
    DeleteMessage,
    ReceiveMessage,
    Pull,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetQueueUrl => "get_queue_url",
            Self::GetQueueAttributes => "get_queue_attributes",
            Self::CreateQueue => "create_queue",
            Self::DeleteQueue => "delete_queue",
            Self::PurgeQueue => "purge_queue",
            Self::Push => "push",
            Self::DeleteMessage => "delete_message",
            Self::ReceiveMessage => "receive_message",
            Self::Pull => "pull",
        }
    }

    /// Whether a lone value after the queue name is a payload rather than options.
    /// For `DeleteMessage` the payload is the receipt handle.
    pub fn carries_payload(self) -> bool {
        matches!(self, Self::Push | Self::DeleteMessage)
    }

    fn known_options(self) -> &'static [&'static str] {
        match self {
            Self::GetQueueUrl | Self::DeleteQueue | Self::PurgeQueue => {
                &["QueueName", "QueueUrl", "QueueOwnerAWSAccountId"]
            }
            Self::GetQueueAttributes => &[
                "QueueName",
                "QueueUrl",
                "QueueOwnerAWSAccountId",
                "AttributeNames",
            ],
            Self::CreateQueue => &["QueueName", "Attributes"],
            Self::Push => &[
                "QueueName",
                "QueueUrl",
                "QueueOwnerAWSAccountId",
                "MessageBody",
                "DelaySeconds",
                "MessageAttributes",
                "MessageGroupId",
                "MessageDeduplicationId",
            ],
            Self::DeleteMessage => &[
                "QueueName",
                "QueueUrl",
                "QueueOwnerAWSAccountId",
                "ReceiptHandle",
            ],
            Self::ReceiveMessage | Self::Pull => &[
                "QueueName",
                "QueueUrl",
                "QueueOwnerAWSAccountId",
                "MaxNumberOfMessages",
                "WaitTimeSeconds",
                "VisibilityTimeout",
                "AttributeNames",
                "MessageAttributeNames",
                "BodyFormat",
            ],
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One positional argument
pub enum Arg<H> {
    Text(String),
    Value(Value),
    Handler(H),
}

impl<H> Arg<H> {
    fn describe(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Value(_) => "value",
            Self::Handler(_) => "handler",
        }
    }
}

impl<H> fmt::Debug for Arg<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl<H> From<&str> for Arg<H> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl<H> From<String> for Arg<H> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl<H> From<Value> for Arg<H> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Canonical form of a positional call
pub struct OperationRequest<H> {
    pub kind: OperationKind,
    pub queue_name: Option<String>,
    pub payload: Option<Value>,
    pub options: Map<String, Value>,
    pub handler: Option<H>,
}

impl<H> fmt::Debug for OperationRequest<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRequest")
            .field("kind", &self.kind)
            .field("queue_name", &self.queue_name)
            .field("payload", &self.payload)
            .field("options", &self.options)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Assign positional arguments to name, payload, options and handler.
///
/// - a leading text argument is the queue name
/// - a trailing handler is the completion handler
/// - with a name, a single remaining value is the payload for payload-bearing
///   operations and the options otherwise; two values are payload then options
/// - without a name, the single value is the options and must identify the
///   queue through `QueueUrl` or `QueueName`
///
/// No I/O happens here; every shape error is reported before the operation runs.
pub fn normalize<H>(
    kind: OperationKind,
    args: Vec<Arg<H>>,
) -> Result<OperationRequest<H>, QueueError> {
    let count = args.len();
    if count == 0 || count > MAX_ARGUMENTS {
        return Err(QueueError::invalid_arguments(format!(
            "{} takes 1 to {} arguments, got {}",
            kind, MAX_ARGUMENTS, count
        )));
    }

    let mut args = args;
    let handler = match args.pop() {
        Some(Arg::Handler(handler)) => Some(handler),
        Some(last) => {
            args.push(last);
            None
        }
        None => None,
    };

    if args.is_empty() {
        return Err(QueueError::invalid_arguments(format!(
            "{} cannot be called with only a handler",
            kind
        )));
    }

    if count == MAX_ARGUMENTS && !matches!(args.first(), Some(Arg::Text(_))) {
        return Err(QueueError::invalid_arguments(format!(
            "{} with {} arguments needs a queue name first, got {}",
            kind,
            MAX_ARGUMENTS,
            args.first().map(Arg::describe).unwrap_or("nothing")
        )));
    }

    let mut queue_name = None;
    let mut values = Vec::new();
    for (position, arg) in args.into_iter().enumerate() {
        match arg {
            Arg::Text(name) if position == 0 => {
                if name.is_empty() {
                    return Err(QueueError::invalid_arguments("queue name must not be empty"));
                }
                queue_name = Some(name);
            }
            Arg::Text(text) => values.push(Value::String(text)),
            Arg::Value(value) => values.push(value),
            Arg::Handler(_) => {
                return Err(QueueError::invalid_arguments(format!(
                    "{}: a handler is only accepted as the last argument (found at position {})",
                    kind,
                    position + 1
                )))
            }
        }
    }

    let (payload, options) = match values.len() {
        0 => (None, None),
        1 => {
            let value = values.pop();
            if kind.carries_payload() && queue_name.is_some() {
                (value, None)
            } else {
                (None, value)
            }
        }
        2 if kind.carries_payload() => {
            let options = values.pop();
            (values.pop(), options)
        }
        2 => {
            return Err(QueueError::invalid_arguments(format!(
                "{} takes no payload, only options",
                kind
            )))
        }
        n => {
            return Err(QueueError::invalid_arguments(format!(
                "{} got {} values besides the queue name",
                kind, n
            )))
        }
    };

    let options = options_map(kind, options)?;

    match (&queue_name, options.get("QueueName")) {
        (Some(name), Some(Value::String(other))) if other != name => {
            return Err(QueueError::invalid_arguments(format!(
                "queue name '{}' conflicts with QueueName '{}' in the options",
                name, other
            )));
        }
        (_, Some(value)) if !value.is_string() => {
            return Err(QueueError::invalid_arguments("QueueName must be a string"));
        }
        _ => {}
    }

    let has_identity = queue_name.is_some()
        || options.contains_key("QueueName")
        || (kind != OperationKind::CreateQueue && options.contains_key("QueueUrl"));
    if !has_identity {
        return Err(QueueError::invalid_arguments(format!(
            "{} needs a queue name or a QueueUrl in the options",
            kind
        )));
    }

    Ok(OperationRequest {
        kind,
        queue_name,
        payload,
        options,
        handler,
    })
}

fn options_map(kind: OperationKind, options: Option<Value>) -> Result<Map<String, Value>, QueueError> {
    match options {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Array(names)) if kind == OperationKind::GetQueueAttributes => {
            let mut map = Map::new();
            map.insert("AttributeNames".to_string(), Value::Array(names));
            Ok(map)
        }
        Some(other) => Err(QueueError::invalid_arguments(format!(
            "{} options must be an object, got {}",
            kind,
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Conversion into typed requests
// ============================================================================

impl<H> OperationRequest<H> {
    /// Remove the handler so the rest of the request can be consumed by reference
    pub fn take_handler(&mut self) -> Option<H> {
        self.handler.take()
    }

    fn warn_unknown_options(&self) {
        let known = self.kind.known_options();
        for key in self.options.keys() {
            if !known.contains(&key.as_str()) {
                warn!(operation = %self.kind, option = %key, "Ignoring unknown option");
            }
        }
    }

    /// `QueueUrl` from the options wins over name resolution
    pub fn target(&self) -> Result<QueueTarget, QueueError> {
        if let Some(url) = self.options.get("QueueUrl") {
            let url = as_string(url, "QueueUrl")?;
            return Ok(QueueTarget::Url(QueueUrl::new(url)?));
        }

        let name = match (&self.queue_name, self.options.get("QueueName")) {
            (Some(name), _) => name.clone(),
            (None, Some(name)) => as_string(name, "QueueName")?.to_string(),
            (None, None) => {
                return Err(QueueError::invalid_arguments(format!(
                    "{} needs a queue name or a QueueUrl in the options",
                    self.kind
                )))
            }
        };

        let target = QueueTarget::name(name);
        match self.options.get("QueueOwnerAWSAccountId") {
            Some(owner) => Ok(target.with_owner(AccountId::new(as_string(
                owner,
                "QueueOwnerAWSAccountId",
            )?))),
            None => Ok(target),
        }
    }

    pub fn to_create_request(&self) -> Result<CreateQueueRequest, QueueError> {
        self.warn_unknown_options();
        let name = match (&self.queue_name, self.options.get("QueueName")) {
            (Some(name), _) => name.clone(),
            (None, Some(name)) => as_string(name, "QueueName")?.to_string(),
            (None, None) => {
                return Err(QueueError::invalid_arguments("create_queue needs a queue name"))
            }
        };

        let attributes = match self.options.get("Attributes") {
            Some(value) => string_map(value, "Attributes")?,
            None => Attributes::new(),
        };

        Ok(CreateQueueRequest { name, attributes })
    }

    pub fn to_attributes_request(&self) -> Result<AttributesRequest, QueueError> {
        self.warn_unknown_options();
        Ok(AttributesRequest {
            target: self.target()?,
            attribute_names: optional_string_list(&self.options, "AttributeNames")?,
        })
    }

    pub fn to_push_request(&self) -> Result<PushRequest, QueueError> {
        self.warn_unknown_options();
        let payload = self
            .payload
            .clone()
            .or_else(|| self.options.get("MessageBody").cloned())
            .map(Payload::from);

        let message_attributes = match self.options.get("MessageAttributes") {
            Some(value) => message_attributes(value)?,
            None => Attributes::new(),
        };

        Ok(PushRequest {
            target: self.target()?,
            payload,
            options: SendOptions {
                delay_seconds: optional_u32(&self.options, "DelaySeconds")?,
                message_attributes,
                message_group_id: optional_string(&self.options, "MessageGroupId")?,
                message_deduplication_id: optional_string(
                    &self.options,
                    "MessageDeduplicationId",
                )?,
            },
        })
    }

    pub fn to_receive_request(&self) -> Result<ReceiveRequest, QueueError> {
        self.warn_unknown_options();
        let body_format = match self.options.get("BodyFormat") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
                QueueError::invalid_arguments(format!(
                    "BodyFormat must be one of auto, json or text, got {}",
                    value
                ))
            })?,
            None => BodyFormat::default(),
        };

        Ok(ReceiveRequest {
            target: self.target()?,
            options: ReceiveOptions {
                max_messages: optional_u32(&self.options, "MaxNumberOfMessages")?,
                wait_time_seconds: optional_u32(&self.options, "WaitTimeSeconds")?,
                visibility_timeout: optional_u32(&self.options, "VisibilityTimeout")?,
                attribute_names: optional_string_list(&self.options, "AttributeNames")?,
                message_attribute_names: optional_string_list(
                    &self.options,
                    "MessageAttributeNames",
                )?,
            },
            body_format,
        })
    }

    pub fn to_delete_message_request(&self) -> Result<DeleteMessageRequest, QueueError> {
        self.warn_unknown_options();
        let receipt = match (&self.payload, self.options.get("ReceiptHandle")) {
            (Some(value), _) | (None, Some(value)) => as_string(value, "ReceiptHandle")?,
            (None, None) => {
                return Err(QueueError::invalid_arguments(
                    "delete_message needs a receipt handle",
                ))
            }
        };

        Ok(DeleteMessageRequest {
            target: self.target()?,
            receipt_handle: ReceiptHandle::new(receipt),
        })
    }
}

fn as_string<'a>(value: &'a Value, key: &str) -> Result<&'a str, QueueError> {
    value
        .as_str()
        .ok_or_else(|| QueueError::invalid_arguments(format!("{} must be a string", key)))
}

fn optional_string(options: &Map<String, Value>, key: &str) -> Result<Option<String>, QueueError> {
    options
        .get(key)
        .map(|v| as_string(v, key).map(str::to_string))
        .transpose()
}

/// Numbers may be given as JSON numbers or numeric strings
fn optional_u32(options: &Map<String, Value>, key: &str) -> Result<Option<u32>, QueueError> {
    let Some(value) = options.get(key) else {
        return Ok(None);
    };

    let number = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    };

    number.map(Some).ok_or_else(|| {
        QueueError::invalid_arguments(format!(
            "{} must be a non-negative integer, got {}",
            key, value
        ))
    })
}

fn optional_string_list(options: &Map<String, Value>, key: &str) -> Result<Vec<String>, QueueError> {
    match options.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| as_string(item, key).map(str::to_string))
            .collect(),
        Some(_) => Err(QueueError::invalid_arguments(format!(
            "{} must be a list of strings",
            key
        ))),
    }
}

/// Scalar values are stringified; nested values are rejected
fn string_map(value: &Value, key: &str) -> Result<Attributes, QueueError> {
    let Value::Object(map) = value else {
        return Err(QueueError::invalid_arguments(format!("{} must be an object", key)));
    };

    map.iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(QueueError::invalid_arguments(format!(
                        "{}.{} must be a string, number or boolean",
                        key, name
                    )))
                }
            };
            Ok((name.clone(), text))
        })
        .collect()
}

/// Accepts plain values or the provider shape `{"DataType": .., "StringValue": ..}`
fn message_attributes(value: &Value) -> Result<Attributes, QueueError> {
    let Value::Object(map) = value else {
        return Err(QueueError::invalid_arguments(
            "MessageAttributes must be an object",
        ));
    };

    let mut attributes = Attributes::new();
    for (name, value) in map {
        let flattened = match value {
            Value::Object(inner) => match inner.get("StringValue") {
                Some(string_value) => string_value.clone(),
                None => {
                    return Err(QueueError::invalid_arguments(format!(
                        "MessageAttributes.{} needs a StringValue",
                        name
                    )))
                }
            },
            other => other.clone(),
        };
        let mut single = Map::new();
        single.insert(name.clone(), flattened);
        attributes.extend(string_map(&Value::Object(single), "MessageAttributes")?);
    }

    Ok(attributes)
}
