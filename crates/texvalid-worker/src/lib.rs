//! Runs the texvalid parser away from the editing thread and decides which of
//! its diagnostics an editor should show.
//!
//! The [`worker`] owns a [`session::LintSession`] on a background thread and
//! speaks the [`protocol`]. On the editor side a [`client::LintClient`] feeds
//! the worker's events through a [`reconciler::Reconciler`], which drives a
//! host-provided [`reconciler::MarkerHost`].

pub mod client;
pub mod config;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod worker;

pub use client::LintClient;
pub use config::{ConfigError, WorkerConfig};
pub use protocol::{Event, Request};
pub use reconciler::{Cursor, MarkerHost, MarkerMode, Reconciler};
pub use session::LintSession;
pub use worker::WorkerHandle;
