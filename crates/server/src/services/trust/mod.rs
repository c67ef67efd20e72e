pub mod evaluator;
pub mod policy;

pub use evaluator::{evaluate, TrustAssessment, TrustSignals, TrustTier, MIN_WITHDRAW_SCORE};
pub use policy::{min_tier_for_action, TierPolicy, MAX_WITHDRAWAL_ATTEMPTS_PER_HOUR};
