//! In-process reference provider for the Nexar HAL.
//!
//! [`LocalProvider`] implements the full provider contract without leaving
//! the process: batched submission with composite `base:i` job ids,
//! availability gating with adjustable device state, and sandboxed
//! source-code execution through `nexar-script`. It is the default target
//! for orchestrator tests and single-node deployments.

mod provider;

pub use provider::{LocalProvider, QPU_DEVICE, SIM_DEVICE};
