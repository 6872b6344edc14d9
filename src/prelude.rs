//! # caswalk Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! from the caswalk library. Import this module to get quick access to the
//! essential types for capability evaluation.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all caswalk operations
pub use crate::Error;

/// The result type used throughout caswalk
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The top-level context owning the token registry and demand entry points
pub use crate::engine::SecurityContext;

/// Frame descriptors supplied by the external stack walker
pub use crate::engine::FrameDescriptor;

// ================================================================================================
// Capability Contract and Built-ins
// ================================================================================================

/// The abstract capability contract and shared instance handle
pub use crate::capability::{Capability, CapabilityRc};

/// Built-in capability types
pub use crate::capability::{
    BuiltinKind, EnvironmentCapability, FileIoCapability, ReflectionCapability,
    RegistryCapability, SecurityCapability, UiCapability,
};

/// Flag and level types used by the built-ins
pub use crate::capability::{
    ClipboardAccess, PathSet, ReflectionFlags, SecurityFlags, WindowAccess,
};

// ================================================================================================
// Sets and Tokens
// ================================================================================================

/// The sparse capability-set collection and its algebra
pub use crate::set::{CapabilitySet, Shortfall};

/// Token interning service and handles
pub use crate::registry::{CapToken, TokenClass, TokenDescriptor, TokenRegistry};

// ================================================================================================
// Frame State and Compression
// ================================================================================================

/// Per-frame modifier records and the walk decision type
pub use crate::engine::{FrameModifiers, FrameSecurityState, WalkDecision};

/// Segment triples, the compressor and captured stacks
pub use crate::engine::{CompressedStack, SegmentTriple, TripleCompressor};
