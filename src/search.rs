//! Query strings for collection searches, e.g.
//! `/check?f__tags_has=cat%3Atag&search=test`.

use std::collections::BTreeMap;

/// Free-text search expression sent as the `search` parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchQuery(String);

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SearchQuery {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Field filters, keyed by parameter name (`f_<field>` or `f__<field>`).
///
/// A key may carry several values; each becomes its own parameter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SearchFilter(BTreeMap<String, Vec<String>>);

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one value for `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

impl<K, V> FromIterator<(K, V)> for SearchFilter
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |filter, (key, value)| filter.with(key, value))
    }
}

/// Builds `/<resource>[?<params>]` for a collection search.
///
/// Parameters are form-encoded and ordered by key; `search` is merged with
/// the filter keys so both conditions apply. An empty query and an empty
/// filter yield the bare collection path.
pub fn search_path(
    resource: &str,
    query: Option<&SearchQuery>,
    filter: Option<&SearchFilter>,
) -> String {
    let mut params: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    if let Some(filter) = filter {
        for (key, values) in &filter.0 {
            params
                .entry(key.as_str())
                .or_default()
                .extend(values.iter().map(String::as_str));
        }
    }
    if let Some(query) = query.filter(|query| !query.as_str().is_empty()) {
        params.entry("search").or_default().push(query.as_str());
    }

    let mut path = format!("/{}", resource.trim_matches('/'));
    if params.values().all(Vec::is_empty) {
        return path;
    }

    let mut encoder = url::form_urlencoded::Serializer::new(String::new());
    for (key, values) in &params {
        for value in values {
            encoder.append_pair(key, value);
        }
    }
    path.push('?');
    path.push_str(&encoder.finish());
    path
}
