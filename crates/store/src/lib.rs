//! Configuration repository for the intent recognition service.
//!
//! The recognition core treats the relational store as an opaque repository
//! of four entity kinds: applications (tenant configuration), intent
//! categories, intent rules, and recognition logs. This crate provides the
//! read paths the pipeline depends on — `get_application_by_key`,
//! `get_categories_by_application`, `get_active_rules_for_categories`,
//! log persistence — plus assembly of the per-request [`AppContext`]
//! aggregate behind a short-TTL in-process cache.
//!
//! Admin CRUD endpoints live outside this service; the write methods here
//! exist to carry the cache-invalidation hooks those collaborators rely on.

pub mod context;
pub mod error;
pub mod models;
pub mod repo;

pub use context::{AppContext, ContextCache};
pub use error::{StoreError, StoreResult};
pub use models::{
    Application, IntentCategory, IntentRule, LogStats, RecognitionLog, RuleKind,
};
pub use repo::ConfigRepository;
