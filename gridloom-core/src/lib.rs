// gridloom-core/src/lib.rs

// 1. Mandatory documentation for production code
#![allow(missing_docs)]
// 2. Memory safety
#![deny(unsafe_code)]
// 3. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 4. Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Contracts the application consumes (Warehouse, DatasetResolver, AuditSink).
pub mod ports;

// 2. Domain (Business core)
// Records, transform engine, quality checks, dimensional model.
// Depends on NOTHING else (neither infra nor app).
pub mod domain;

// 3. Infrastructure (Adapters)
// Technical implementations (DuckDB, YAML config, bronze/silver storage, audit).
// Depends on the Domain and the Ports.
pub mod infrastructure;

// 4. Application (Use Cases)
// Orchestration (Pipeline, Gate Runner, Loaders, Lifecycle Sweep).
// Depends on the Domain, the Infra and the Ports.
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
// Lets callers import the main error easily: use gridloom_core::GridloomError;
pub use error::GridloomError;
