use std::fmt;
use std::sync::Arc;

type Check = dyn Fn(&str) -> bool + Send + Sync;

/// A named test applied to the raw state of each observation.
///
/// The description shows up in timeout and assertion messages, so keep it
/// short and readable ("== Running", "contains Complete").
#[derive(Clone)]
pub struct StatePredicate {
    description: String,
    check: Arc<Check>,
}

impl StatePredicate {
    pub fn new<F>(description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            check: Arc::new(check),
        }
    }

    pub fn equals(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::new(format!("== {expected}"), move |s| s == expected)
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(format!("contains {needle}"), move |s| s.contains(&needle))
    }

    pub fn not_contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(format!("does not contain {needle}"), move |s| {
            !s.contains(&needle)
        })
    }

    pub fn non_empty() -> Self {
        Self::new("is non-empty", |s| !s.trim().is_empty())
    }

    /// Satisfied by any successful fetch.
    pub fn present() -> Self {
        Self::new("is present", |_| true)
    }

    pub fn any_of<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accepted: Vec<String> =
            accepted.into_iter().map(Into::into).collect();
        Self::new(format!("one of {accepted:?}"), move |s| {
            accepted.iter().any(|a| a == s)
        })
    }

    pub fn and(self, other: StatePredicate) -> Self {
        let description =
            format!("{} and {}", self.description, other.description);
        Self::new(description, move |s| self.test(s) && other.test(s))
    }

    pub fn test(&self, state: &str) -> bool {
        (self.check)(state)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for StatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatePredicate")
            .field(&self.description)
            .finish()
    }
}

impl fmt::Display for StatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
