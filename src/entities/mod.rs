// Entity Models
// Ledger data the scanner reasons about, fetched once per run

pub mod account;

pub use account::{AccountIndex, AccountKind, AccountRecord};
