// src/exec/mod.rs

//! Process execution layer.
//!
//! [`backend`] provides the `ExecutorBackend` trait and the concrete
//! `RealExecutorBackend` built on `tokio::process::Command`. Commands call
//! it to spawn their process and to tear down the whole process tree.

pub mod backend;

pub use backend::{
    ExecutorBackend, ExitFuture, ExitInfo, ProcessReader, ProcessWriter, RealExecutorBackend,
    SpawnRequest, SpawnedProcess, join_shell_line,
};
