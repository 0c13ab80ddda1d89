//! Core identity types shared by the wallet engine and the factory

pub mod address;

pub use address::Address;
