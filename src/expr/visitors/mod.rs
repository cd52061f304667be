//! Pure evaluators over bound predicates: manifest pruning, metrics pruning,
//! partition projection and residual computation.

pub mod inclusive_metrics_evaluator;
pub mod inclusive_projection;
pub mod manifest_evaluator;
pub mod residual_evaluator;
