/*!
 * Core Utilities
 * Shared helpers used across the filesystem layers
 */

pub mod serde;
