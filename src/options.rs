use crate::{index::Scope, value::Locale};

/// Options controlling filter compilation
#[derive(Clone, Debug)]
pub struct CompileOptions {
    optimize: bool,
    deduplicate: bool,
    required_scopes: Vec<Scope>,
    locale: Option<Locale>,
    now: i64,
    selection_hints: bool,
}

impl CompileOptions {
    /// Create a new builder for CompileOptions
    ///
    /// # Example
    /// ```
    /// use sift::{CompileOptions, Scope};
    ///
    /// let options = CompileOptions::builder()
    ///     .required_scopes(vec![Scope::Live, Scope::Archived])
    ///     .deduplicate(false)
    ///     .build();
    /// ```
    pub fn builder() -> CompileOptionsBuilder {
        CompileOptionsBuilder::default()
    }

    /// Check if the optimizer pass runs on the final formula
    pub fn optimize(&self) -> bool {
        self.optimize
    }

    /// Check if the deduplication pass runs on the final formula
    pub fn deduplicate(&self) -> bool {
        self.deduplicate
    }

    /// Scopes records are searched in unless the filter narrows them
    pub fn required_scopes(&self) -> &[Scope] {
        &self.required_scopes
    }

    /// Locale used when the filter itself does not specify one
    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    /// Moment used by price validity predicates without an explicit moment
    pub fn now(&self) -> i64 {
        self.now
    }

    /// Check if attribute predicates of the root block get selection wrappers
    pub fn selection_hints(&self) -> bool {
        self.selection_hints
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions::builder().build()
    }
}

/// Builder for CompileOptions
#[derive(Clone, Debug, Default)]
pub struct CompileOptionsBuilder {
    optimize: Option<bool>,
    deduplicate: Option<bool>,
    required_scopes: Option<Vec<Scope>>,
    locale: Option<Locale>,
    now: Option<i64>,
    selection_hints: Option<bool>,
}

impl CompileOptionsBuilder {
    /// Enable or disable the optimizer pass (default: true)
    ///
    /// Without it unsatisfiable conjunctions are kept in the tree and only
    /// evaluate to nothing when computed.
    pub fn optimize(mut self, value: bool) -> Self {
        self.optimize = Some(value);
        self
    }

    /// Enable or disable structural deduplication (default: true)
    pub fn deduplicate(mut self, value: bool) -> Self {
        self.deduplicate = Some(value);
        self
    }

    /// Scopes searched by default (default: live only)
    ///
    /// An `EntityScope` predicate in the top-level conjunction narrows this set
    /// for the whole compilation.
    pub fn required_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.required_scopes = Some(scopes);
        self
    }

    /// Fallback locale for localized attributes (default: none)
    pub fn locale(mut self, locale: impl Into<Locale>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Moment in microseconds used as "now" by price validity (default: 0)
    pub fn now(mut self, moment: i64) -> Self {
        self.now = Some(moment);
        self
    }

    /// Enable or disable selection hints (default: false)
    ///
    /// When enabled, attribute predicates in the top-level conjunction are
    /// wrapped so they can be evaluated on prefetched records instead of
    /// the index.
    pub fn selection_hints(mut self, value: bool) -> Self {
        self.selection_hints = Some(value);
        self
    }

    /// Build the CompileOptions
    pub fn build(self) -> CompileOptions {
        CompileOptions {
            optimize: self.optimize.unwrap_or(true),
            deduplicate: self.deduplicate.unwrap_or(true),
            required_scopes: self.required_scopes.unwrap_or_else(|| vec![Scope::Live]),
            locale: self.locale,
            now: self.now.unwrap_or(0),
            selection_hints: self.selection_hints.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CompileOptions::default();
        assert!(options.optimize());
        assert!(options.deduplicate());
        assert_eq!(options.required_scopes(), &[Scope::Live]);
        assert!(options.locale().is_none());
        assert_eq!(options.now(), 0);
        assert!(!options.selection_hints());
    }

    #[test]
    fn builder_overrides() {
        let options = CompileOptions::builder()
            .optimize(false)
            .locale("cs")
            .now(42)
            .selection_hints(true)
            .build();
        assert!(!options.optimize());
        assert_eq!(options.locale(), Some(&Locale::from("cs")));
        assert_eq!(options.now(), 42);
        assert!(options.selection_hints());
    }
}
