/// Published after a mod's configuration is loaded, saved or reset.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChanged<C> {
    pub config: C,
}

impl<C> ConfigChanged<C> {
    /// Wrap the options that are now current.
    pub fn new(config: C) -> Self {
        Self { config }
    }
}

/// A lifecycle milestone carrying a single enum value, e.g. "integrations ready".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal<T>(pub T);

impl<T> Signal<T> {
    /// The milestone reached.
    pub fn value(&self) -> &T {
        &self.0
    }
}
