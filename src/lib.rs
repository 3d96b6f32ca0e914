//! Simulation core for an N-link pendulum chain.
//!
//! A chain of `N` equal rigid links hangs from a fixed pivot. Each frame it is
//! either integrated under gravity ([`Pendulum::tick`], RK4 over the Lagrangian
//! equations of motion) or dragged by one joint ([`Pendulum::drag_to`],
//! single-pass FABRIK). A bounded [`TraceBuffer`] keeps recent snapshots for
//! drawing a trail.
//!
//! ```
//! use n_pendulum_chain::{ChainConfig, Pendulum};
//!
//! let mut chain = Pendulum::new(ChainConfig::new(3, 0.5, 9.8)).unwrap();
//! chain.drag_to(3, 1.0, 0.5).unwrap();
//! chain.tick(1.0 / 60.0).unwrap();
//! chain.record_trace();
//! assert_eq!(chain.positions().len(), 4);
//! ```
//!
//! The [`ui`] module hosts chains behind an actix-web JSON API.

pub mod chain;
pub mod config;
pub mod error;
pub mod ik;
pub mod logic;
pub mod math;
pub mod plot;
pub mod trace;
pub mod ui;

pub use chain::{FrameClock, JointState, Pendulum, Representation};
pub use config::{ChainConfig, ServerConfig};
pub use error::ChainError;
pub use ik::{fabrik_pass, FabrikOutcome};
pub use logic::ChainSolver;
pub use math::{forward_kinematics, Energy, Point};
pub use trace::TraceBuffer;
