use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Opaque metadata tag attached to a value, e.g. `sensitive`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mark(Arc<str>);

pub type Marks = BTreeSet<Mark>;

impl Mark {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Mark(Arc::from(tag.as_ref()))
    }

    pub fn sensitive() -> Self {
        Mark::new("sensitive")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Mark {
    fn from(tag: &str) -> Self { Mark::new(tag) }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mark({:?})", &*self.0)
    }
}
