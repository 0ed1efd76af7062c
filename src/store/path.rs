/// Deterministic mapping between logical keys and node paths under the
/// store root.
///
/// Keys are direct children of the root. The empty key is a valid, distinct
/// entry and maps to a child with an empty name (`"<root>/"`), not to the
/// root node itself.
#[derive(Debug, Clone)]
pub(crate) struct PathResolver {
    root: String,
}

impl PathResolver {
    pub(crate) fn new(root: &str) -> Self {
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self { root }
    }

    pub(crate) fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn path(
        &self,
        key: &str,
    ) -> String {
        format!("{}/{}", self.root, key)
    }

    /// Inverts [`Self::path`]. Returns `None` for the root itself, for
    /// paths outside the root, and for grandchildren.
    pub(crate) fn key_of<'a>(
        &self,
        path: &'a str,
    ) -> Option<&'a str> {
        let rest = path.strip_prefix(self.root.as_str())?.strip_prefix('/')?;
        if rest.contains('/') {
            return None;
        }
        Some(rest)
    }
}
