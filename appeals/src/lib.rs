//! # Appeals
//!
//! Internal appeals (ticketing) service: departments raise tickets to other
//! departments, staff claim and resolve them, and everybody involved talks in
//! a message thread with read receipts.
//!
//! ## Architecture
//!
//! ```text
//! HTTP / WebSocket (api, server)
//!   └─ AppealsService (services)          authorize → transact → invalidate → emit
//!        ├─ appeals-core                  state machine, thread algorithms, ports
//!        ├─ appeals-postgres              TicketStore / MessageStore / Directory
//!        ├─ TicketCache (cache)           Redis or in-process
//!        └─ EventEmitter (emitter)  ──▶   FanoutHub ──▶ WebSocket subscribers
//!                                   └──▶  PushNotifier (notify), skipping live viewers
//! ```
//!
//! The binary wires everything through [`ApplicationBuilder`] and runs an
//! [`runtime::Application`] until Ctrl+C or SIGTERM.

#![forbid(unsafe_code)]

pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod emitter;
pub mod metrics;
pub mod notify;
pub mod runtime;
pub mod server;
pub mod services;
pub mod storage;
pub mod views;

pub use bootstrap::ApplicationBuilder;
pub use config::Config;
pub use emitter::{EmitterWorker, EventEmitter, RealtimeEvent};
pub use server::{build_router, AppState};
pub use services::{AppealsService, ServiceDeps};
