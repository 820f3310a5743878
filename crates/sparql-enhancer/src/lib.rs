//! Query enhancement
//!
//! Rewrites SELECT queries so that entity-typed result columns come back with
//! human-readable labels. Classification is heuristic and works on raw query
//! text; a query the enhancer cannot understand is returned unchanged.

mod classify;
pub mod enhancer;
pub mod projection;

pub use classify::{has_label_binding, is_label_output, ENTITY_NAME_HINTS, LABEL_SUFFIXES};
pub use enhancer::{QueryEnhancementPlan, QueryEnhancer, DEFAULT_LABEL_LANGUAGE};
