use arrow_schema::DataType;
use thiserror::Error;

use crate::{predicate::PredicateKind, schema::AttributeTrait};

/// Result alias used throughout the compiler.
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised while compiling a filter into a formula.
///
/// Two families exist. Consistency errors (see [`FilterError::is_fatal`]) signal a
/// defect in the compiler or in its configuration and abort the compilation. All
/// other variants describe a filter that does not fit the schema and are meant to
/// be reported back to the user as query validation failures.
///
/// A filter that is merely unsatisfiable is never an error: it compiles to the
/// empty formula.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// A predicate kind reached the compiler without a registered translator.
    #[error("No translator registered for predicate `{kind}`")]
    MissingTranslator {
        /// Kind of the predicate that could not be translated
        kind: PredicateKind,
    },

    /// One of the compiler stacks was left at an unexpected depth.
    #[error("Unbalanced {stack} stack: expected depth {expected}, found {found}")]
    UnbalancedStack {
        /// Name of the stack (`formula`, `scope` or `post-processor`)
        stack: &'static str,
        /// Depth that was expected at this point
        expected: usize,
        /// Depth that was actually observed
        found: usize,
    },

    /// A processing scope was requested or popped while the scope stack was empty.
    #[error("Processing scope stack is empty")]
    EmptyScopeStack,

    /// An entity view was entered while another view was already active.
    #[error("Underlying predicate composition cannot be nested more than one level deep")]
    NestedUnderlyingPredicate,

    /// Entity schema of the given type is not known to the catalog.
    #[error("Entity schema '{entity_type}' not found")]
    EntitySchemaNotFound {
        /// Name of the entity type
        entity_type: String,
    },

    /// Attribute is not declared in the schema in scope.
    #[error("Attribute '{attribute}' not found in schema '{schema}'")]
    AttributeNotFound {
        /// Name of the attribute that was not found
        attribute: String,
        /// Entity type or `entity.reference` path that was searched
        schema: String,
    },

    /// Reference is not declared in the entity schema.
    #[error("Reference '{reference}' not found in entity schema '{entity_type}'")]
    ReferenceNotFound {
        /// Name of the reference
        reference: String,
        /// Entity type that was searched
        entity_type: String,
    },

    /// Attribute exists but lacks a trait the predicate requires.
    #[error("Attribute '{attribute}' must be {required} to be used in this predicate")]
    MissingAttributeTrait {
        /// Name of the attribute
        attribute: String,
        /// The trait the attribute is missing
        required: AttributeTrait,
    },

    /// Reference exists but is not indexed for filtering.
    #[error("Reference '{reference}' of entity '{entity_type}' is not indexed")]
    ReferenceNotIndexed {
        /// Name of the reference
        reference: String,
        /// Entity type declaring the reference
        entity_type: String,
    },

    /// Literal does not match the declared attribute type.
    #[error("Attribute '{attribute}' is of type {expected:?}, cannot compare with {found:?}")]
    TypeMismatch {
        /// Name of the attribute
        attribute: String,
        /// Declared type of the attribute
        expected: DataType,
        /// Type of the literal in the predicate
        found: DataType,
    },

    /// A localized attribute was queried without any locale in scope.
    #[error("Attribute '{attribute}' is localized, a locale must be specified")]
    LocaleRequired {
        /// Name of the attribute
        attribute: String,
    },

    /// Hierarchy predicate used on an entity without a hierarchy.
    #[error("Entity '{entity_type}' is not hierarchical")]
    NotHierarchical {
        /// Entity type targeted by the predicate
        entity_type: String,
    },

    /// Price predicate used on an entity without prices.
    #[error("Entity '{entity_type}' has no prices")]
    PricesNotEnabled {
        /// Entity type targeted by the predicate
        entity_type: String,
    },

    /// `EntityHaving` appeared outside of a `ReferenceHaving` container.
    #[error("EntityHaving may only be used inside ReferenceHaving")]
    EntityHavingOutsideReference,

    /// The catalog has no index required to evaluate the predicate.
    #[error("Index required to evaluate {what} is not available")]
    IndexRequired {
        /// Description of what needed the index
        what: String,
    },
}

impl FilterError {
    /// Returns true for internal consistency errors.
    ///
    /// These are never caused by user input, retrying cannot help and callers
    /// should surface them as internal failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FilterError::MissingTranslator { .. }
                | FilterError::UnbalancedStack { .. }
                | FilterError::EmptyScopeStack
                | FilterError::NestedUnderlyingPredicate
        )
    }
}
