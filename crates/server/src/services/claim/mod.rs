pub mod claim_service;

pub use claim_service::{ClaimOutcome, ClaimService, ClaimServiceTrait, DynClaimService, SubmitClaimCommand};

#[cfg(test)]
mod tests;
