#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::complexity,
    clippy::correctness,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    deprecated,
    unused,
    clippy::todo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::unreachable,
    clippy::missing_safety_doc,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::missing_docs
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else,
    clippy::cognitive_complexity,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::struct_excessive_bools,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp,
    clippy::doc_markdown,
    clippy::wildcard_imports,
    clippy::struct_field_names,
    clippy::module_inception,
    clippy::missing_fields_in_debug,
    clippy::use_self,
    clippy::return_self_not_must_use,
    clippy::bool_to_int_with_if,
    clippy::partial_pub_fields,
    clippy::multiple_crate_versions,
    clippy::single_match_else,
    clippy::implicit_hasher,
    clippy::linkedlist,
    clippy::default_trait_access,
    clippy::missing_transmute_annotations,
    clippy::multiple_inherent_impl,
    clippy::get_unwrap,
    clippy::impl_trait_in_params,
    clippy::future_not_send,
    clippy::type_complexity,
    clippy::result_large_err,
    clippy::large_stack_frames,
    clippy::significant_drop_in_scrutinee,
    clippy::significant_drop_tightening,
    clippy::items_after_statements,
    clippy::match_wildcard_for_single_variants,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::unused_async,
    clippy::unnecessary_wraps,
    clippy::trivially_copy_pass_by_ref,
    clippy::match_same_arms,
    clippy::explicit_deref_methods,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::from_iter_instead_of_collect,
    clippy::if_not_else,
    clippy::equatable_if_let,
    clippy::or_fun_call,
    clippy::iter_without_into_iter,
    clippy::infinite_loop,
    clippy::ref_as_ptr,
    clippy::ref_option_ref,
    clippy::option_option,
    clippy::match_bool,
    clippy::let_underscore_untyped,
    clippy::empty_enum_variants_with_brackets,
    clippy::pattern_type_mismatch,
    clippy::ignored_unit_patterns,
    clippy::redundant_pub_crate,
    clippy::allow_attributes,
    clippy::no_effect_underscore_binding,
    clippy::used_underscore_binding,
    clippy::tests_outside_test_module
)]

//! # oxidb - an embedded, column-oriented vector-search database core
//!
//! `oxidb` is an embedded query-execution engine: ACID transactions over a
//! column store, a cost-based planner, and approximate nearest-neighbor
//! search via vector-approximation-file (VAF) and product-quantization (PQ)
//! indexes.
//!
//! ## Features
//!
//! - **ACID transactions**: one `StorageTransaction` per entity write, a
//!   lock manager with deadlock detection and shared→exclusive upgrade
//! - **Column-oriented storage**: one named store per column, written
//!   through a per-column sequence/statistics catalogue
//! - **Index framework**: hash, VAF, and PQ indexes behind a common `Index`
//!   trait, selected by cost at plan time
//! - **Cost-based query optimization**: an LRU plan cache, logical rewrites
//!   (conjunction decomposition, filter pushdown, column deferral), and
//!   physical enumeration of index-scan alternatives
//! - **Pull-based operator executor**: filter/sort/limit/projection compose
//!   over a stream of records
//!
//! ## Quick Start
//!
//! ```no_run
//! use oxidb::core::catalogue::Database;
//! use oxidb::core::common::types::{ColumnDef, DataType, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open("my_database".as_ref())?;
//! db.create_schema("main")?;
//! db.create_entity(
//!     "main",
//!     "features",
//!     vec![ColumnDef::new("id".to_string(), DataType::Long, false, true)],
//! )?;
//! db.insert_row("main", "features", vec![("id".to_string(), Value::Long(1))])?;
//! let rows = db.scan_entity("main", "features", &["id".to_string()])?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Catalogue**: the single owner of schema/entity/column/index metadata
//!   and the shared page store (`core::catalogue`)
//! - **Storage**: persistent named key→value stores plus a transactional
//!   wrapper (`core::storage`)
//! - **Transaction**: per-column and per-entity transactions, and the lock
//!   manager serializing concurrent access (`core::transaction`)
//! - **Indexing**: the index framework and its hash/VAF/PQ implementations
//!   (`core::indexing`)
//! - **Query/Optimizer/Execution**: the plan tree, cost-based optimizer, and
//!   pull-based operator executor (`core::query`, `core::optimizer`,
//!   `core::execution`)

pub mod core;

pub use crate::core::catalogue::Database;
pub use crate::core::common::types::Value;
pub use crate::core::common::OxidbError;
