//! # healthpal
//!
//! Treatment sponsorship ledger and remote consultation service.
//!
//! Patients open funding campaigns for treatments; donors fund them with
//! direct donations or gateway card payments. Every credit and refund
//! moves the campaign's running total and its funded state atomically with
//! the transaction row. Alongside the ledger, patients book consultations
//! with doctors and hold audio or video calls inside them.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, payment gateway webhooks)
//!     │
//!     ├── REST Handlers + JWT auth (api/)
//!     │
//!     ├── LedgerService / ConsultationService / UserService (service/)
//!     ├── PaymentGateway (payment/)
//!     ├── EventBus (domain/) ──► notification Dispatcher (notify/)
//!     │
//!     └── Stores: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod payment;
pub mod persistence;
pub mod service;
