//! Handoff graph: which agent may transfer control to which.
//!
//! Nodes are agents (`Participant`s), edges are declared transitions, and one
//! participant is the coordinator where every run starts. Terminal agents
//! have no outgoing edges.

pub mod handoff;

pub use handoff::{HandoffGraph, Participant};
