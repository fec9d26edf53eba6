//! Job alerts: criteria matching, delivery timing, email dispatch and the
//! HTTP surface subscribers use to manage their alerts.

pub mod dispatcher;
pub mod emails;
pub mod handlers;
pub mod matcher;
pub mod naming;
pub mod schedule;
pub mod store;
