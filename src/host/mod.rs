// Host boundary
// Test descriptors and the listener reacting to lifecycle notifications

pub mod descriptor;
pub mod listener;

pub use descriptor::{Scope, TestDescriptor, TestId};
pub use listener::{ListenerOptions, TestListener};
