pub mod settlement_service;

pub use settlement_service::{
    DisabledChainClient, DynSettlementService, SettlementOutcome, SettlementService, SettlementServiceTrait,
};
