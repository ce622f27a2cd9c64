//! User Events - a reference application for the Courier event pipeline
//!
//! This crate shows the pieces an application adds on top of the pipeline:
//!
//! - **Domain events**: `user.created`, `user.updated` (with a changes map) and
//!   `user.deleted`, all carrying the shared event envelope
//! - **Publish-on-commit**: [`UserService`](service::UserService) mutates users inside a
//!   transaction and publishes only once the transaction committed
//! - **Handlers**: one handler per event type, run by queue consumers
//! - **Worker**: the `user-events-worker` binary consumes the three user queues until
//!   SIGINT/SIGTERM
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   commit    ┌──────────────────┐
//! │ UserService  │────────────►│  InMemoryUserStore│
//! └──────┬───────┘             └──────────────────┘
//!        │ publish (after commit)
//!        ▼
//! ┌──────────────┐       ┌─────────────────────────────────────┐
//! │ SNS topic    │──────►│ user-created / user-updated /       │
//! └──────────────┘       │ user-deleted queues                 │
//!                        └──────────────┬──────────────────────┘
//!                                       ▼
//!                        ┌─────────────────────────────────────┐
//!                        │ user-events-worker (3 consumers)    │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use user_events::model::NewUser;
//! use user_events::service::UserService;
//! use user_events::store::InMemoryUserStore;
//!
//! let service = UserService::new(InMemoryUserStore::new(), publisher);
//! let user = service
//!     .create_user(NewUser::new("ada@example.com", "Ada", "Lovelace"))
//!     .await?;
//! ```

pub mod config;
pub mod diff;
pub mod events;
pub mod handlers;
pub mod model;
pub mod service;
pub mod store;
pub mod validation;

pub use config::{Config, ConfigError};
pub use events::{UserCreated, UserDeleted, UserEvent, UserUpdated, user_event_table};
pub use service::{UserError, UserService};
pub use store::{InMemoryUserStore, UserTx};
