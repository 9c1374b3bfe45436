// Core types and record storage for the Dossier connector server

pub mod types;
pub mod storage;

pub use types::*;
