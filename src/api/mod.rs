//! # Route Integration
//!
//! The surface host applications wire into their HTTP routes.

pub mod route_context;

pub use route_context::{
    DataSourceClientError, DataSourceRouteContext, ErrorBody, RouteDataSourceClient,
};
