pub mod client;
pub mod error;

pub use client::{ChainClientTrait, DynChainClient, TreasuryClient, TxReceipt};
pub use error::ChainError;
