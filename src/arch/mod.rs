//! # Architecture Abstraction Layer
//!
//! The kernel needs two things from the hardware: "switch threads soon"
//! (`port::pend_switch()`) and a periodic tick that calls
//! `kernel::on_tick()`. Everything else is portable.
//!
//! `port` is the Cortex-M4 port on ARM targets and the host port elsewhere.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
#[cfg(target_arch = "arm")]
pub use cortex_m4 as port;

#[cfg(not(target_arch = "arm"))]
pub mod host;
#[cfg(not(target_arch = "arm"))]
pub use host as port;
