//! PriceGuard Core: domain types, source adapters, normalization,
//! validation, reconciliation and the forecast check.
//!
//! This crate contains everything that operates on one symbol at a time:
//! - Canonical record/series types and the clean/quarantine partition
//! - Source adapters (Yahoo Finance, ECB, local CSV, synthetic)
//! - Normalizer from raw adapter frames to canonical series
//! - Validation Engine with composable quality rules
//! - Reconciliation against an independent benchmark series
//! - Forecast band check
//!
//! Orchestration across symbols lives in `priceguard-runner`.

pub mod data;
pub mod domain;
pub mod forecast;
pub mod reconcile;
pub mod validation;
