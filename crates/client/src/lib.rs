//! Client code for pocketsw.
//!
//! This crate provides the HTTP network layer, the strategy dispatcher and
//! the worker lifecycle shared by the server binary.

pub mod dispatch;
pub mod fetch;
pub mod worker;

#[cfg(test)]
mod testing;

pub use reqwest::Method;

pub use dispatch::{Dispatch, Dispatcher, ResourceRequest, ResponseSource, Served};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, Network};
pub use worker::{
    ClearReply, Command, CommandReply, InstallReport, PrefetchReply, PrefetchResult, ServiceWorker, WorkerState,
};
