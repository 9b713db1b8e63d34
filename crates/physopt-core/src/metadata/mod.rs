//! Pluggable per-operator metadata dispatch.
//!
//! Cost estimation asks questions such as "how many rows does this subplan produce"
//! without knowing which operator it is looking at. Handlers registered in a
//! [`HandlerRegistry`] answer those questions for particular operator variants; a
//! [`Dispatcher`] built per variant routes each [`MetadataKind`] to the matching
//! handlers. Dispatchers are built once per distinct handler set and shared
//! process-wide through [`DispatcherCache`]; computed values are memoised per
//! planning session by [`MetadataQuery`].

mod cache;
mod dispatcher;
mod handler;
mod kind;
mod query;

pub use cache::{resolve_dispatcher, DispatcherCache};
pub use dispatcher::{DispatchSignature, Dispatcher};
pub use handler::{HandlerBinding, HandlerRegistry, MetadataHandler};
pub use kind::{MetadataArg, MetadataKind, MetadataValue, ParamType};
pub use query::MetadataQuery;
