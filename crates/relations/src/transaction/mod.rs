//! The unit-of-work handle and its scope hierarchy

mod client_transaction;
mod loading;
mod relations;
pub(crate) mod scope;
mod sync_service;
mod unload;

pub use client_transaction::ClientTransaction;
