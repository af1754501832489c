//! Access prediction: pure scoring plus the caching service.

pub mod score;
pub mod scorer;

pub use score::{
    calculate_score, causal_strength, compute_prediction, estimate_next_access, frequency_score,
    generate_reasons, temporal_score,
};
pub use scorer::{PropagationScorer, PropagationStats};
