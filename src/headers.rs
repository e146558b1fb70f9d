use std::collections::HashMap;

/// Key under which [`parse_headers`] stores the status line.
pub const STATUS_KEY: &str = "Status";

/// Value of a parsed header: scalar until the name repeats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderEntry {
    Single(String),
    Multi(Vec<String>),
}

impl HeaderEntry {
    /// First value seen for the header.
    pub fn first(&self) -> &str {
        match self {
            Self::Single(value) => value,
            Self::Multi(values) => values.first().map(String::as_str).unwrap_or_default(),
        }
    }

    /// All values in arrival order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => {
                let first = std::mem::take(first);
                *self = Self::Multi(vec![first, value]);
            }
            Self::Multi(values) => values.push(value),
        }
    }
}

impl From<&str> for HeaderEntry {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl<const N: usize> From<[&str; N]> for HeaderEntry {
    fn from(values: [&str; N]) -> Self {
        Self::Multi(values.iter().map(|value| (*value).to_owned()).collect())
    }
}

/// Header block parsed into name → value(s), status line under [`STATUS_KEY`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedHeaders {
    entries: HashMap<String, HeaderEntry>,
}

impl ParsedHeaders {
    /// Returns the entry stored under the exact header name.
    pub fn get(&self, name: &str) -> Option<&HeaderEntry> {
        self.entries.get(name)
    }

    /// Returns the status line, if the block had one.
    pub fn status(&self) -> Option<&str> {
        self.get(STATUS_KEY).map(HeaderEntry::first)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    fn insert(&mut self, name: &str, value: &str) {
        match self.entries.get_mut(name) {
            Some(entry) => entry.push(value.to_owned()),
            None => {
                self.entries.insert(name.to_owned(), HeaderEntry::from(value));
            }
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ParsedHeaders
where
    K: Into<String>,
    V: Into<HeaderEntry>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(name, entry)| (name.into(), entry.into()))
                .collect(),
        }
    }
}

/// Parses a raw `\r\n`-separated header block.
///
/// The first line is the status line. Every further line is split once on
/// `": "`; a name seen more than once collects its values in arrival order.
pub fn parse_headers(raw: &str) -> ParsedHeaders {
    let mut headers = ParsedHeaders::default();
    let mut lines = raw.split("\r\n");

    match lines.next() {
        Some(status) if !status.is_empty() => headers.insert(STATUS_KEY, status),
        _ => return headers,
    }

    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(": ").unwrap_or((line, ""));
        headers.insert(name, value);
    }

    headers
}

/// Renders the head of a response as a raw header block.
pub(crate) fn header_block(response: &reqwest::Response) -> String {
    let status = response.status();
    let mut block = format!(
        "{:?} {} {}\r\n",
        response.version(),
        status.as_str(),
        status.canonical_reason().unwrap_or_default()
    );
    for (name, value) in response.headers() {
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push_str("\r\n");
    }
    block.push_str("\r\n");
    block
}
