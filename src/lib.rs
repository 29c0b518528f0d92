// Library for tests to access modules

pub mod config;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod models;
pub mod monitor;
pub mod probe;
pub mod retry;
pub mod runtime;
