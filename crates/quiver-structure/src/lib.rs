//! Data model for directed relational structures.
//!
//! A relational structure is a finite node universe together with an ordered
//! tuple of directed edge relations over that universe; the one-relation case
//! is an ordinary digraph. This crate also provides [`DomainMap`], the
//! per-node candidate-set state that propagation and search operate on.

pub mod domain;
pub mod structure;

pub use domain::DomainMap;
pub use structure::{NodeId, Relation, RelationalStructure};
