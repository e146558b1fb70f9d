use url::form_urlencoded::byte_serialize;

use crate::FetchError;

/// Request body container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Sent verbatim.
    Text(String),
    /// Key-value pairs sent URL-encoded as `k=v&k=v`.
    Form(Vec<(String, String)>),
}

impl Payload {
    /// Builds a text payload.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Builds a form payload from key-value pairs.
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Converts a loosely-shaped JSON value into a payload.
    ///
    /// Strings become text payloads and objects with scalar members become
    /// forms. Anything else is rejected with [`FetchError::InvalidPayload`].
    pub fn from_json(value: serde_json::Value) -> Result<Self, FetchError> {
        use serde_json::Value;

        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(text) => text,
                        Value::Null => String::new(),
                        Value::Bool(_) | Value::Number(_) => value.to_string(),
                        Value::Array(_) | Value::Object(_) => {
                            return Err(FetchError::InvalidPayload(format!(
                                "nested value for key '{key}'"
                            )))
                        }
                    };
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Form),
            other => Err(FetchError::InvalidPayload(json_kind(&other).to_owned())),
        }
    }

    pub(crate) fn is_form(&self) -> bool {
        matches!(self, Self::Form(_))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl<K, V> From<Vec<(K, V)>> for Payload
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        Self::form(pairs)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Payload
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        Self::form(pairs)
    }
}

impl TryFrom<serde_json::Value> for Payload {
    type Error = FetchError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

/// Body values accepted by [`crate::FetchClient::post`] and friends.
///
/// Conversion failures surface as the call's [`FetchError::InvalidPayload`].
pub trait IntoPayload {
    fn into_payload(self) -> Result<Payload, FetchError>;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Result<Payload, FetchError> {
        Ok(self)
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> Result<Payload, FetchError> {
        Ok(Payload::Text(self))
    }
}

impl IntoPayload for &str {
    fn into_payload(self) -> Result<Payload, FetchError> {
        Ok(Payload::text(self))
    }
}

impl IntoPayload for serde_json::Value {
    fn into_payload(self) -> Result<Payload, FetchError> {
        Payload::from_json(self)
    }
}

impl<K, V> IntoPayload for Vec<(K, V)>
where
    K: Into<String>,
    V: Into<String>,
{
    fn into_payload(self) -> Result<Payload, FetchError> {
        Ok(Payload::form(self))
    }
}

impl<K, V, const N: usize> IntoPayload for [(K, V); N]
where
    K: Into<String>,
    V: Into<String>,
{
    fn into_payload(self) -> Result<Payload, FetchError> {
        Ok(Payload::form(self))
    }
}

/// Serializes a payload into the request body string.
///
/// Form keys and values are percent-escaped and joined with `&`.
pub fn data_to_s(data: &Payload) -> String {
    match data {
        Payload::Text(text) => text.clone(),
        Payload::Form(pairs) => pairs
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    byte_serialize(key.as_bytes()).collect::<String>(),
                    byte_serialize(value.as_bytes()).collect::<String>()
                )
            })
            .collect::<Vec<_>>()
            .join("&"),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
