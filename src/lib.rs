pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod core;
pub mod dialect;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod transport;

pub use crate::core::error::{FailureClass, RouterError};
pub use crate::core::types::*;
pub use router::{ModelRouter, ModelRouterBuilder, RoutedResponse, RoutingDecision};
