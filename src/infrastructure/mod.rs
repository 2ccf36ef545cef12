//! Infrastructure module for external services.
//!
//! This module contains the document store backends, configuration,
//! outbound mail and the security primitives.

pub mod batch;
pub mod factory;
pub mod in_memory;
pub mod mailer;
pub mod postgres;
pub mod query;
pub mod reconcile;
pub mod repository;
pub mod security;

pub use batch::{WriteBatch, WriteOperation};
pub use factory::{
    AppSettings, AppSettingsBuilder, ConfigurationError, FactoryError, MailMode, MailSettings,
    ServiceFactory, Services, StorageMode,
};
pub use in_memory::InMemoryDocumentStore;
pub use mailer::{HttpMailer, LogMailer, Mail, MailError, Mailer, dispatch};
pub use postgres::PostgresDocumentStore;
pub use query::{Filter, Query, Sort, SortDirection, SortKind};
pub use reconcile::{ReconcileReport, reconcile_counters, spawn_reconciler};
pub use repository::{
    Collection, CommitOutcome, Document, DocumentStore, PaginatedResult, Pagination, Repository,
    RepositoryError, StoredDocument,
};
pub use security::{SecurityError, TokenError, TokenIssuer, generate_code, hash_password, is_code, verify_password};
