use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ResponderError;
use crate::ids::AgentAddress;
use crate::models::{AgentDescriptor, PollStatus, WeatherQuery};

/// Lists the agents a query can be sent to.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn search_agents(&self) -> Result<Vec<AgentDescriptor>, ResponderError>;
}

/// External service that accepts a query and later exposes a polled result.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Hand `payload` to the agent at `target`. `Ok` means accepted.
    async fn submit(&self, target: &AgentAddress, payload: &WeatherQuery)
        -> Result<(), ResponderError>;

    /// Check the result endpoint once.
    async fn poll_result(&self) -> Result<PollStatus, ResponderError>;
}

#[async_trait]
impl<T: AgentDirectory + ?Sized> AgentDirectory for Arc<T> {
    async fn search_agents(&self) -> Result<Vec<AgentDescriptor>, ResponderError> {
        (**self).search_agents().await
    }
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Arc<T> {
    async fn submit(
        &self,
        target: &AgentAddress,
        payload: &WeatherQuery,
    ) -> Result<(), ResponderError> {
        (**self).submit(target, payload).await
    }

    async fn poll_result(&self) -> Result<PollStatus, ResponderError> {
        (**self).poll_result().await
    }
}
