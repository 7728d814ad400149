//! relprop — automated relational feature engineering.
//!
//! Given a *population* table and one or more *peripheral* tables linked by
//! join keys (and optionally by time stamps), the engine enumerates a large
//! space of candidate aggregate features over the matched peripheral rows,
//! scores them against the targets, keeps the best, and materializes
//! numeric feature matrices along with equivalent SQL.
//!
//! # Architecture
//!
//! - [`frame`] — columnar tables with roles, units and interned encodings
//! - [`placeholder`] — the relational schema tree
//! - [`engine`] — the feature-propagation core: match enumeration,
//!   incremental aggregation state machines, candidate enumeration, R²
//!   selection, recursive subfeature composition and the parallel row
//!   driver
//! - [`sql`] — dialect-independent SQL emission per feature
//! - [`persist`] — serializable fitted-engine records
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use relprop::config::Hyperparameters;
//! use relprop::engine::{AggKind, FeatureEngine};
//! use relprop::frame::{DataFrame, FloatColumn, IntColumn};
//! use relprop::placeholder::SchemaTree;
//!
//! let mut population = DataFrame::new("population");
//! population
//!     .add_join_key(IntColumn::new("customer", "", vec![0, 1]))
//!     .unwrap();
//! population
//!     .add_target(FloatColumn::new("churned", "", vec![0.0, 1.0]))
//!     .unwrap();
//!
//! let mut orders = DataFrame::new("orders");
//! orders
//!     .add_join_key(IntColumn::new("customer", "", vec![0, 0, 1]))
//!     .unwrap();
//! orders
//!     .add_numerical(FloatColumn::new("amount", "", vec![10.0, 20.0, 5.0]))
//!     .unwrap();
//!
//! let mut tree = SchemaTree::new("population");
//! tree.join_on(tree.root(), "orders", "customer", "customer");
//!
//! let hyperparameters = Hyperparameters {
//!     aggregations: vec![AggKind::Count, AggKind::Sum],
//!     num_threads: 1,
//!     ..Default::default()
//! };
//!
//! let mut engine =
//!     FeatureEngine::new(hyperparameters, vec!["orders".to_string()], tree).unwrap();
//!
//! let population = Arc::new(population);
//! let orders = Arc::new(orders);
//! engine.fit(&population, &[Arc::clone(&orders)]).unwrap();
//!
//! let matrix = engine.transform(&population, &[orders]).unwrap();
//! assert_eq!(matrix.nrows(), 2);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod hash;
pub mod persist;
pub mod placeholder;
pub mod sql;

pub use config::Hyperparameters;
pub use engine::{AbstractFeature, AggKind, FeatureEngine, FeatureMatrix, RunOptions};
pub use error::{RelPropError, RelPropErrorKind};
pub use frame::{DataFrame, DataFrameView};
pub use placeholder::SchemaTree;
pub use sql::{HumanReadableSql, SqlDialect};
