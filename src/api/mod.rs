//! Client for the task REST surface (`/tasks`, `/add`, `/archive`, `/archives`, `/perm_delete`).

pub mod api_types;
mod client;

pub use client::TaskApi;
