//! Imposter domain: data model, request matching, response generation.

pub mod matcher;
pub mod response;
pub mod types;

pub use types::{
    ImposterConfig, ImposterRecord, ImposterStatus, Predicate, PredicateField, PredicateOperator,
    ProxyConfig, ProxyMode, RequestContext, RequestLogEntry, ResponseConfig, ResponseMode, Stub,
    StubSpec,
};
