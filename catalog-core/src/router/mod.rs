//! Operation routing and editor-scope enforcement

pub mod error;
pub mod operation;
pub mod scope_router;

pub use error::{RouterError, RouterResult};
pub use operation::{Access, Operation};
pub use scope_router::ScopeRouter;
