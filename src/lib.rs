#![doc = include_str!("../README.md")]

mod common;
mod error;
pub mod query;
pub mod routing;
mod signal;

pub use crate::common::{Id, PeerInfo, ID_SIZE};
pub use crate::error::{Error, QueryFuncError};
pub use crate::query::{
    Config, MessageKind, QueryContext, QueryEvent, QueryFunc, QueryManager, QueryReplies,
    QueryReply, QueryRun, RunOptions,
};
pub use crate::routing::{ConnectionManager, RoutingTable};
pub use crate::signal::{CancelToken, Gate};

pub use bytes::Bytes;
