//! Translators of the standard registry, one module per predicate family.

pub(crate) mod attribute;
pub(crate) mod entity;
pub(crate) mod hierarchy;
pub(crate) mod logical;
pub(crate) mod price;
pub(crate) mod reference;
