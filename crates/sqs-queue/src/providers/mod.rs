//! Backend implementations.
//!
//! This module contains concrete implementations of the [`QueueService`] and
//! [`IdentityService`] traits.
//!
//! [`QueueService`]: crate::service::QueueService
//! [`IdentityService`]: crate::service::IdentityService

pub mod aws;
pub mod memory;

pub use aws::{AwsError, AwsSqsService, AwsStsIdentity};
pub use memory::{InMemoryQueueService, ServiceCall, ServiceOperation};
