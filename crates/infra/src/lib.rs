//! Infrastructure layer of the job agent: catalog stores, step execution,
//! the job runner and job thread, notifications and configuration.

pub mod config;
pub mod db;
pub mod event_bus;
pub mod executor;
pub mod notify;
pub mod runner;


pub use config::{AgentConfig, ConfigError};
pub use db::{
    AuditEntry, Catalog, CatalogPool, InMemoryCatalog, InMemoryStepDatabases, PostgresCatalog,
    PostgresStepDatabases, StepDatabases, StepLogUpdate, StepSession, StoreError,
};
pub use executor::{Dispatch, StepExecutor, StepOutcome};
pub use notify::{EmailHook, NoopEmailHook, Notifier};
pub use runner::{AgentServices, JobRunner, JobThread, RunError};
