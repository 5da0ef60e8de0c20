// Request and response primitives, protocol codes
pub mod primitive;
pub mod error;

// Resource model and storage
pub mod resource;
pub mod store;

// Request processing
pub mod acp;
pub mod check;
pub mod collector;
pub mod crud;
pub mod dispatcher;
pub mod notify;

// Transport bindings and CSE federation
pub mod binder;
pub mod federation;

pub mod config;
pub mod node;
