//! `flowable` crate: the contract with the external workflow engine.
//!
//! The deployment engine only ever talks to the workflow engine through
//! [`WorkflowEngineClient`].  [`rest::FlowableRestClient`] implements it
//! over Flowable's REST API; [`mock::MockEngineClient`] is the test double.

pub mod error;
pub mod traits;
pub mod rest;
pub mod mock;

pub use error::ClientError;
pub use traits::{ProcessDeployment, WorkflowEngineClient};
pub use rest::{FlowableConfig, FlowableRestClient};
