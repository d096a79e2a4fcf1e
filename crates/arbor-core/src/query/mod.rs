//! # Query Engine
//!
//! Answers `NodeQuery` / `RelationshipQuery` items:
//!
//! 1. candidate resolution (sort index, ids, unique index, type index)
//! 2. type-level read gate and row-level ownership filter
//! 3. dual-view shaping, recursing through selected relationship props
//! 4. predicate evaluation (`filterBy`, then `findBy`)
//! 5. the post-processing pipeline (sort, limit, derived, aggregates, copy)
//! 6. collapse to a single value where the relation is singular
//!
//! Every computation reads the `original` view; only the `now` view is
//! permission-filtered and alias-renamed.

mod derived;
mod engine;
mod filter;
mod pipeline;
pub mod types;

pub use engine::{QueryTarget, run, view};
pub use types::{
    Comparison, ComputeAs, Expr, Filter, FlowStep, Limit, Operand, PropRef, PropSelection,
    QueryOptions, Selection, Sort, SortHow, Symbol, UniqueLookup,
};
