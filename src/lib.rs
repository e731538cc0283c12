//! Reimbursement-recovery engine: ingests a seller's marketplace
//! transaction history, runs six families of loss-detection algorithms
//! over it, scores each finding's certainty, and drafts a reimbursement
//! brief — on a recurring per-seller schedule.

pub mod brief;
pub mod canonical;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod marketplace;
pub mod repository;
pub mod scheduler;
pub mod scoring;
pub mod sync;
pub mod verify;

pub mod detection;
