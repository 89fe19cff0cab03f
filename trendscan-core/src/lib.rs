//! TrendScan Core: domain types, indicators, trend-template screen, market data.
//!
//! This crate holds everything that does not touch the database:
//! - Domain types (bars, asset keys, criteria rows)
//! - Rolling-window indicator library (ATR, SMA/VMA, log returns)
//! - Trend-template criteria evaluator
//! - Trading-day calendar arithmetic
//! - Configuration and credentials
//! - Bar provider trait, Alpaca client, universe, skip list and CSV archive

pub mod calendar;
pub mod config;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod screen;
