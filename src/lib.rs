//! Compiles filtering predicate trees into lazy, memoized bitmap formulas.
//!
//! A [`Predicate`] tree is translated by a [`FilterCompiler`] into a
//! [`Formula`], optimized and deduplicated, and evaluated with
//! [`Formula::compute`]. [`FilterPlanner`] wraps the compiler and picks the
//! cheapest among several alternative index sets.

mod compile;
mod error;
mod formula;
mod index;
pub mod memory;
mod options;
mod planner;
mod predicate;
mod result;
mod schema;
mod value;

pub use compile::{
    FilterCompiler, PostProcessor, ProcessingScope, SelectionTagger, TranslateFn, Translator,
    TranslatorRegistry, join_formulas,
};
pub use error::{FilterError, FilterResult};
pub use formula::{Deduplicator, Formula, FormulaKind, SelectionAlternative, deduplicate, optimize};
pub use index::{
    AttributeQuery, AttributeValueAccessor, EntityAttributeValues, EntityRecord, HierarchyQuery,
    IndexCatalog, IndexKey, IndexKind, IndexLookup, PrefetchedRecords, PriceQuery,
    RecordSetIndex, ReferenceAttributeValues, Scope,
};
pub use memory::{InMemoryCatalog, InMemoryIndex, InMemoryIndexBuilder, MemoryPrice, MemoryRecord};
pub use options::{CompileOptions, CompileOptionsBuilder};
pub use planner::{FilterPlanner, TargetIndexes};
pub use predicate::{AttributeFilter, AttributeOp, Nullness, Predicate, PredicateKind};
pub use result::{AlternativeCost, CompiledFilter};
pub use schema::{
    AttributeSchema, AttributeSchemaAccessor, AttributeTrait, EntitySchema, ReferenceSchema,
};
pub use value::{AttributeValue, Locale};
