//! Session scheduling and analytics aggregation core.
//!
//! The crate is organised as a hexagonal domain: [`domain`] holds the
//! entities, services, and ports for the time-partitioned session ledger,
//! recurrence expansion, derived aggregate views, and the refresh pipeline;
//! [`outbound`] holds the Diesel/PostgreSQL adapters and the in-process
//! refresh job queue that drains rebuild work off the request path.
//!
//! Inbound transports (HTTP, CLI, cron triggers) live outside this crate and
//! consume the domain services directly.

pub mod domain;
pub mod outbound;
