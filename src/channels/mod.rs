//! External boundaries of the broker.

pub mod web;
