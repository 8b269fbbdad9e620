// Scheduling and eligibility engine for recurring cleaning activities.

pub mod anchor;
pub mod calendar;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod frequency;
pub mod ledger;
pub mod model;
pub mod recorder;
pub mod service;
pub mod web;

pub use error::{Error, Result};
