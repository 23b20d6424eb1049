use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{DynError, ThreadData};
use crate::{
    fixture::ClusterFixture,
    runtime::{PhaseContext, StateContext},
};

pub type ActionResult = Result<(), DynError>;

#[async_trait]
/// Behaviour executed while an agent sits in a named state.
///
/// Implemented for closures of the shape
/// `|data, ctx| async move { .. }.boxed()`; implement it directly when an
/// action carries its own configuration.
pub trait StateAction<Fx>: Send + Sync {
    async fn call(&self, data: &mut ThreadData, ctx: &StateContext<'_, Fx>) -> ActionResult;
}

#[async_trait]
impl<Fx, F> StateAction<Fx> for F
where
    Fx: ClusterFixture,
    F: for<'a> Fn(&'a mut ThreadData, &'a StateContext<'a, Fx>) -> BoxFuture<'a, ActionResult>
        + Send
        + Sync,
{
    async fn call(&self, data: &mut ThreadData, ctx: &StateContext<'_, Fx>) -> ActionResult {
        self(data, ctx).await
    }
}

#[async_trait]
/// Setup or teardown step, run exactly once per workload run.
pub trait PhaseAction<Fx>: Send + Sync {
    async fn call(&self, ctx: &PhaseContext<'_, Fx>) -> ActionResult;
}

#[async_trait]
impl<Fx, F> PhaseAction<Fx> for F
where
    Fx: ClusterFixture,
    F: for<'a> Fn(&'a PhaseContext<'a, Fx>) -> BoxFuture<'a, ActionResult> + Send + Sync,
{
    async fn call(&self, ctx: &PhaseContext<'_, Fx>) -> ActionResult {
        self(ctx).await
    }
}
