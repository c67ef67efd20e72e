pub mod account_dto;
pub mod claim_dto;
pub mod withdrawal_dto;
