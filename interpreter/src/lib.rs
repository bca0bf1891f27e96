pub mod call_tree;
pub mod config;
mod directives;
pub mod error;
pub mod executor;
pub mod frame;
pub mod services;

pub use call_tree::{CallRecord, CallTree, RecordId};
pub use config::Config;
pub use error::RuntimeError;
pub use executor::{FileDiagnostics, Interpreter, Invocation};
pub use frame::{Frame, Step};
pub use services::{
    CommandRunner, CompletionRequest, ContextSink, DocumentLoader, History, NoHistory, Services,
    TextCompletion,
};
