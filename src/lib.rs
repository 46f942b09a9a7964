//! Post-build ESM → CommonJS conversion for compiled output trees.
//!
//! The upstream compiler emits ES-module syntax (and sometimes a half
//! converted mix) into an output tree whose layout it also disturbs: the
//! source `src/` level is duplicated one directory deeper, namespace
//! aliases are left unexpanded, and inter-module references frequently
//! point at the wrong extension or the wrong nesting level. This crate
//! rewrites that tree in place so it is loadable as-is under the
//! CommonJS runtime:
//!
//! 1. discovery walks the tree and classifies every candidate file;
//! 2. the rewriter folds declarative import/export syntax into `require`
//!    calls and `module.exports` assignments via an ordered rule list
//!    (no AST - the rules target one known compiler's output shape);
//! 3. the alias resolver and path fixer repair inter-module references
//!    against the real, post-rename file set;
//! 4. the orchestrator owns backup, rollback, the failure threshold and
//!    the statistics the run reports.
//!
//! The whole pipeline is idempotent: re-running it over an already
//! converted tree is a no-op.

pub mod alias;
pub mod config;
pub mod convert;
pub mod detect;
pub mod discovery;
pub mod error;
pub mod resolve;
pub mod rewrite;
pub mod shims;

pub use config::Config;
pub use convert::{ConversionStats, Converter, MAX_CONVERSION_FAILURES};
pub use error::ConvertError;
