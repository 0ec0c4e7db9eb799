//! Proctored exam sessions: the session state machine and its clocks, the
//! integrity policy, persistence and submission, plus the terminal runtime and
//! screen the `quizguard` binary is built from.
pub mod app_dirs;
pub mod config;
pub mod controller;
pub mod error;
pub mod integrity;
pub mod policy;
pub mod quiz;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod store;
pub mod submit;
pub mod timer;
pub mod ui;
