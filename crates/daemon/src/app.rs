// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon context and the route table.

use crate::middleware;
use crate::routes;
use axum::routing::{delete, get, post, put};
use axum::Router;
use corral_allocator::Allocator;
use corral_bus::{Bus, Ur};
use corral_core::SystemClock;
use corral_engine::{
    Heartbeater, RebootOrchestrator, ServerRegistry, TaskDispatcher, Waitlist, WorkflowAdapter,
};
use corral_store::ObjectStore;
use std::sync::Arc;

/// Shared context for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServerRegistry<SystemClock>>,
    pub heartbeat: Arc<Heartbeater<SystemClock>>,
    pub waitlist: Arc<Waitlist<SystemClock>>,
    pub tasks: Arc<TaskDispatcher<SystemClock>>,
    pub orchestrator: Arc<RebootOrchestrator<SystemClock>>,
    pub allocator: Arc<Allocator>,
    pub ur: Ur,
    pub bus: Arc<dyn Bus>,
    pub store: Arc<dyn ObjectStore>,
    pub workflow: Arc<dyn WorkflowAdapter>,
}

/// Build the route table over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(routes::misc::ping))
        .route("/platforms", get(routes::misc::platforms))
        .route("/servers", get(routes::servers::list))
        .route("/servers/:uuid", get(routes::servers::get_one))
        .route("/servers/:uuid", post(routes::servers::update))
        .route("/servers/:uuid", delete(routes::servers::delete_one))
        .route("/servers/:uuid/factory-reset", put(routes::servers::factory_reset))
        .route("/servers/:uuid/sysinfo", post(routes::servers::post_sysinfo))
        .route("/servers/:uuid/execute", post(routes::servers::execute))
        .route("/servers/:uuid/reboot", post(routes::servers::reboot))
        .route("/allocate", post(routes::allocation::allocate))
        .route("/capacity", post(routes::allocation::capacity))
        .route("/servers/:uuid/tickets", get(routes::tickets::list_for_server))
        .route("/servers/:uuid/tickets", post(routes::tickets::create))
        .route("/servers/:uuid/tickets", delete(routes::tickets::flush_for_server))
        .route("/tickets/:uuid", get(routes::tickets::get_one))
        .route("/tickets/:uuid", delete(routes::tickets::delete_one))
        .route("/tickets/:uuid/wait", get(routes::tickets::wait))
        .route("/tickets/:uuid/release", put(routes::tickets::release))
        .route("/tasks/:taskid", get(routes::tasks::get_one))
        .route("/tasks/:taskid/wait", get(routes::tasks::wait))
        .route("/boot/default", get(routes::boot::get_default))
        .route("/boot/default", put(routes::boot::set_default))
        .route("/boot/default", post(routes::boot::update_default))
        .route("/boot/:uuid", get(routes::boot::get_params))
        .route("/boot/:uuid", put(routes::boot::set_params))
        .route("/boot/:uuid", post(routes::boot::update_params))
        .route("/reboot-plans", get(routes::plans::list))
        .route("/reboot-plans", post(routes::plans::create))
        .route("/reboot-plans/:uuid", get(routes::plans::get_one))
        .route("/reboot-plans/:uuid", put(routes::plans::action))
        .route("/reboot-plans/:uuid", delete(routes::plans::delete_one))
        .route("/reboot-plans/:uuid/reboots/:reboot_uuid", get(routes::plans::get_reboot))
        .layer(axum::middleware::from_fn(middleware::deadline))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
