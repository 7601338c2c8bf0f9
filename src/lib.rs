//! pixiv timelines as RSS/Atom feeds.
//!
//! The crate splits into a credential side ([`auth`], [`storage`],
//! [`session`]) and a feed side ([`pixiv`], [`feed`], [`service`]), joined
//! behind the HTTP [`server`] and the `pixiv-feed` binary.

pub mod auth;
pub mod config;
pub mod feed;
pub mod pixiv;
pub mod server;
pub mod service;
pub mod session;
pub mod storage;
pub mod util;

#[cfg(test)]
mod test_support;
