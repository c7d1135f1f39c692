/*!
 * UVFS Names
 * Case-insensitive path and filename values with character validation
 */

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::errors::{UvfsError, UvfsResult};

/// Case-folded string shared by [`Pathname`] and [`Filename`]
///
/// The folded form is computed once at construction; equality, ordering and
/// hashing only ever look at it. The original spelling is kept for display.
#[derive(Clone)]
struct Folded {
    raw: String,
    folded: String,
}

impl Folded {
    fn new(raw: String) -> Self {
        let folded = raw.to_lowercase();
        Self { raw, folded }
    }
}

impl PartialEq for Folded {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for Folded {}

impl Hash for Folded {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for Folded {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Folded {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded.cmp(&other.folded)
    }
}

/// Reject line feeds and NULs anywhere, and carriage returns anywhere but
/// the final position (Finder's `Icon\r` convention).
fn validate_chars(name: &str) -> UvfsResult<()> {
    if name.contains('\n') || name.contains('\0') {
        return Err(UvfsError::InvalidArgument(format!(
            "bad name: {:?} contains a line feed or NUL",
            name
        )));
    }
    if let Some(pos) = name.find('\r') {
        if pos + 1 != name.len() {
            return Err(UvfsError::InvalidArgument(format!(
                "bad name: {:?} contains an embedded carriage return",
                name
            )));
        }
    }
    Ok(())
}

/// A single directory-entry key
///
/// Compares case-insensitively: `ReadMe` and `README` are the same entry.
/// Never contains a path separator.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Filename(Folded);

impl Filename {
    /// Create a filename with validation
    pub fn new(name: impl Into<String>) -> UvfsResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(UvfsError::InvalidArgument("filename cannot be empty".into()));
        }
        if name.contains('/') {
            return Err(UvfsError::InvalidArgument(format!(
                "bad filename: {:?} contains a slash",
                name
            )));
        }
        validate_chars(&name)?;
        Ok(Self(Folded::new(name)))
    }

    /// Original spelling
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0.raw
    }

    /// Case-folded key
    #[inline]
    #[must_use]
    pub fn folded(&self) -> &str {
        &self.0.folded
    }

    /// Dotfiles are never persisted in the repository
    #[inline]
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.0.raw.starts_with('.')
    }

    /// AppleDouble extended-attribute companion (`._name`)
    #[inline]
    #[must_use]
    pub fn is_xattr_shadow(&self) -> bool {
        self.0.raw.starts_with("._")
    }
}

impl fmt::Debug for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filename({:?})", self.0.raw)
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.raw)
    }
}

impl TryFrom<&str> for Filename {
    type Error = UvfsError;

    fn try_from(value: &str) -> UvfsResult<Self> {
        Filename::new(value)
    }
}

impl PartialEq<str> for Filename {
    fn eq(&self, other: &str) -> bool {
        self.0.folded == other.to_lowercase()
    }
}

impl PartialEq<&str> for Filename {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// An absolute, slash-separated path inside the mount
///
/// Compares case-insensitively. The root is `/`; no other pathname has a
/// trailing slash.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pathname(Folded);

impl Pathname {
    /// Create a pathname with validation
    pub fn new(path: impl Into<String>) -> UvfsResult<Self> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(UvfsError::InvalidArgument(format!(
                "pathname must start with a slash: {:?}",
                path
            )));
        }
        validate_chars(&path)?;
        let trimmed = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path.as_str()
        };
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        if trimmed.contains("//") {
            return Err(UvfsError::InvalidArgument(format!(
                "pathname has an empty component: {:?}",
                path
            )));
        }
        Ok(Self(Folded::new(trimmed.to_string())))
    }

    /// The mount root
    #[must_use]
    pub fn root() -> Self {
        Self(Folded::new("/".to_string()))
    }

    /// Normalize `.` and `..` components and re-validate
    pub fn normalized(path: &str) -> UvfsResult<Self> {
        let cleaned = path_clean::clean(path);
        Self::new(cleaned.to_string_lossy().into_owned())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0.raw
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.raw == "/"
    }

    /// Append one component
    #[must_use]
    pub fn join(&self, name: &Filename) -> Pathname {
        let raw = if self.is_root() {
            format!("/{}", name.as_str())
        } else {
            format!("{}/{}", self.0.raw, name.as_str())
        };
        Pathname(Folded::new(raw))
    }

    /// Resolve a symlink target (absolute or relative) against this path's
    /// directory
    pub fn join_relative(&self, target: &str) -> UvfsResult<Pathname> {
        if target.starts_with('/') {
            return Pathname::normalized(target);
        }
        let dir = self.parent().unwrap_or_else(Pathname::root);
        Pathname::normalized(&format!("{}/{}", dir.as_str(), target))
    }

    /// Parent directory, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Pathname> {
        if self.is_root() {
            return None;
        }
        match self.0.raw.rfind('/') {
            Some(0) => Some(Pathname::root()),
            Some(idx) => Some(Pathname(Folded::new(self.0.raw[..idx].to_string()))),
            None => None,
        }
    }

    /// Last component, `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<Filename> {
        if self.is_root() {
            return None;
        }
        let last = self.0.raw.rsplit('/').next()?;
        Some(Filename(Folded::new(last.to_string())))
    }

    /// Split into parent and final component
    pub fn split(&self) -> UvfsResult<(Pathname, Filename)> {
        match (self.parent(), self.file_name()) {
            (Some(parent), Some(name)) => Ok((parent, name)),
            _ => Err(UvfsError::InvalidArgument(
                "the root has no parent".to_string(),
            )),
        }
    }

    /// Components below the root, in order
    pub fn components(&self) -> impl Iterator<Item = Filename> + '_ {
        self.0
            .raw
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| Filename(Folded::new(c.to_string())))
    }

    /// Number of components below the root
    #[must_use]
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Case-insensitive prefix test on whole components
    #[must_use]
    pub fn starts_with(&self, prefix: &Pathname) -> bool {
        if prefix.is_root() {
            return true;
        }
        let folded = &self.0.folded;
        let pre = &prefix.0.folded;
        folded == pre || (folded.starts_with(pre.as_str()) && folded[pre.len()..].starts_with('/'))
    }
}

impl fmt::Debug for Pathname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pathname({:?})", self.0.raw)
    }
}

impl fmt::Display for Pathname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.raw)
    }
}

impl TryFrom<&str> for Pathname {
    type Error = UvfsError;

    fn try_from(value: &str) -> UvfsResult<Self> {
        Pathname::new(value)
    }
}
