use crate::error::HeaderError;

/// Hop-by-hop headers owned by the transport; guests may not set them.
const FORBIDDEN: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "transfer-encoding",
    "upgrade",
    "http2-settings",
];

/// Ordered multimap of header (or trailer) names to byte-string values.
///
/// Preserves insertion order and duplicate names (e.g. multiple
/// `Set-Cookie` entries). Name lookup is ASCII case-insensitive; names are
/// stored as given. `clone()` is a deep, independent copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, Vec<u8>)>,
}

impl Fields {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from `(name, value)` pairs, validating every entry.
    pub fn from_list<N, V>(entries: impl IntoIterator<Item = (N, V)>) -> Result<Self, HeaderError>
    where
        N: Into<String>,
        V: Into<Vec<u8>>,
    {
        let mut fields = Self::new();
        for (name, value) in entries {
            fields.append(name, value)?;
        }
        Ok(fields)
    }

    /// All values for `name`, in insertion order. Empty if absent.
    pub fn get(&self, name: &str) -> Vec<&[u8]> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Replace every value for `name` with `values`.
    ///
    /// Validation happens before mutation: on error the fields are
    /// unchanged.
    pub fn set<V>(&mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Result<(), HeaderError>
    where
        V: Into<Vec<u8>>,
    {
        let name = name.into();
        validate_name(&name)?;
        let values: Vec<Vec<u8>> = values.into_iter().map(Into::into).collect();
        for value in &values {
            validate_value(value)?;
        }

        self.delete(&name);
        self.entries
            .extend(values.into_iter().map(|value| (name.clone(), value)));
        Ok(())
    }

    /// Remove every entry for `name`.
    pub fn delete(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Add one value for `name` after any existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<(), HeaderError> {
        let name = name.into();
        let value = value.into();
        validate_name(&name)?;
        validate_value(&value)?;
        self.entries.push((name, value));
        Ok(())
    }

    /// Every `(name, value)` pair in order, duplicates included.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, Vec<u8>)> {
        self.entries
    }
}

fn validate_name(name: &str) -> Result<(), HeaderError> {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(HeaderError::InvalidSyntax);
    }
    if FORBIDDEN.iter().any(|f| f.eq_ignore_ascii_case(name)) {
        return Err(HeaderError::Forbidden);
    }
    Ok(())
}

fn validate_value(value: &[u8]) -> Result<(), HeaderError> {
    // HTAB, SP, VCHAR and obs-text; no CR, LF or other controls.
    let valid = value
        .iter()
        .all(|&b| b == b'\t' || (b >= 0x20 && b != 0x7f));
    if valid { Ok(()) } else { Err(HeaderError::InvalidSyntax) }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
