//! Call headers and trailers.

/// Ordered multimap of lower-cased keys to string values.
///
/// Used for request headers, response headers and trailers. Keys are
/// normalised to ASCII lower case on insertion so lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value for `key` with `value`.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().to_ascii_lowercase();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
    }

    /// Add a value for `key`, keeping existing ones.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .push((key.as_ref().to_ascii_lowercase(), value.into()));
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append every entry of `other`.
    pub fn merge(&mut self, other: &Metadata) {
        self.entries.extend(other.entries.iter().cloned());
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.append(k, v);
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let mut md = Metadata::new();
        md.insert("X-Request-Id", "abc");
        assert_eq!(md.get("x-request-id"), Some("abc"));
        assert_eq!(md.get("X-REQUEST-ID"), Some("abc"));
    }

    #[test]
    fn insert_replaces_and_append_accumulates() {
        let mut md = Metadata::new();
        md.append("tag", "a");
        md.append("tag", "b");
        assert_eq!(md.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);

        md.insert("tag", "c");
        assert_eq!(md.get_all("tag").collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn merge_preserves_order() {
        let mut md: Metadata = [("a", "1")].into_iter().collect();
        let other: Metadata = [("b", "2"), ("a", "3")].into_iter().collect();
        md.merge(&other);
        let pairs: Vec<_> = md.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("a", "3")]);
    }
}
