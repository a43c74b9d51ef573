//! Host-side tooling for one dimensional ranging experiments with Pozyx
//! ultra-wideband devices.
//!
//! A capture run repeatedly asks a device to range to a target, keeps every
//! successful distance measurement and every failure, and writes both to
//! CSV files, either one row at a time as the run goes ([`LogMode::Live`])
//! or all at once when it ends ([`LogMode::Batch`]). The pieces are:
//!
//! - [`device_session`], the trait every device implementation provides, with
//!   [`pozyx_serial`] talking to real hardware and [`dummy_device`] standing
//!   in for it
//! - [`capture`], the poll loop itself, and [`recorder`], which runs it
//! - [`run_log_writer`] and [`batch_exporter`], the two ways runs reach disk
//!
//! Finished runs can be examined with [`trace`], [`spectrum`] and
//! [`lowpass`], or in the `monitor` plot viewer.
//!
//! [`LogMode::Live`]: recorder::LogMode::Live
//! [`LogMode::Batch`]: recorder::LogMode::Batch

#![warn(missing_docs)]
pub mod args;
pub mod batch_exporter;
pub mod capture;
pub mod config;
pub mod device_session;
pub mod dummy_device;
pub mod gui;
pub mod lowpass;
pub mod pozyx_message_decoder;
pub mod pozyx_serial;
pub mod recorder;
pub mod run_log_writer;
pub mod spectrum;
pub mod synth;
pub mod trace;
