pub mod balance;
pub mod deposit;
pub mod fingerprint;
pub mod upload;
