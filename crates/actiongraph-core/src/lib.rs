pub mod aggregate;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod export;
pub mod graph;
pub mod io;
pub mod loader;
pub mod model;
pub mod paths;
pub mod requirement;
pub mod store;
pub mod types;
pub mod usage;
pub mod validate;

pub use error::{ActionError, ErrorKind, Result};
pub use graph::ActionGraph;
pub use model::{Action, ActionAudit, Binding, ChildAction, Group, Parameter, Requirement};
pub use types::{ActionId, ActionType, GroupId, UserId};
