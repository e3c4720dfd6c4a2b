//! `ambientled` drives ambient lighting LED strips from the colors at the edges of a screen.
//!
//! # Structure
//!
//! Every refresh cycle, a [`pipeline::Pipeline`] asks its [`mapper::LedMapper`] for a new
//! [`frame::LedFrame`]: each configured screen region is captured once through an
//! [`image::RegionSampler`], and every LED gets the average color of its part of the region.
//! The frame is then written to the strip through a [`channel::Device`], either an
//! Arduino-style serial link or a TCP connection to a single-board LED server.

#[macro_use]
extern crate tracing;

pub mod channel;
pub mod color;
pub mod frame;
pub mod image;
pub mod mapper;
pub mod models;
pub mod pipeline;
pub mod serde;
