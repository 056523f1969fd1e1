#![doc(hidden)]
//! This module is for internal usage by the service_autograph_macro crate only.
//!
//! Contains everything generated service code names, under one path.

pub use crate::service::*;
