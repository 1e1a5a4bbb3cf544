//! vmstack-operator: converges VirtualMachine resources onto orchestration
//! stacks.
//!
//! A [`reconciler::VmReconciler`] interprets each resource's assembly phase
//! and drives the [`stack::StackService`], which renders the stack templates
//! and talks to the orchestration backend. A [`poller::StatusPoller`] lists
//! the backend's stacks on a fixed period and feeds their status back through
//! the reconciler. [`operator::Operator`] wires it all together.

pub mod config;
pub mod operator;
pub mod poller;
pub mod reconciler;
pub mod resource;
pub mod stack;
pub mod store;
pub mod templates;
