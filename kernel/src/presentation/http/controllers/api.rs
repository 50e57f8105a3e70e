use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode};
use serde_json::{Value, json};

use crate::application::events::HTTP_REQUEST_FINISHED;
use crate::bootstrap::kernel::AppKernel;
use crate::presentation::http::context::{HttpContext, HttpResponse};

use super::{ControllerError, unsupported_method};

/// JSON endpoint with one handler per HTTP method.
///
/// Every response carries `status` (false until a handler flips it) and
/// `message`; failures fill `message` and `param`.
#[async_trait]
pub trait ApiController: Send + Sync + 'static {
    /// Methods this endpoint handles. Others are refused before `on_load`.
    fn supports(&self, method: &Method) -> bool;

    async fn on_load(&self, _ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn on_finish(&self, _ctx: &mut HttpContext) {}

    async fn get(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Err(unsupported_method(ctx.method()))
    }

    async fn post(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Err(unsupported_method(ctx.method()))
    }

    async fn put(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Err(unsupported_method(ctx.method()))
    }

    async fn delete(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Err(unsupported_method(ctx.method()))
    }

    async fn patch(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Err(unsupported_method(ctx.method()))
    }
}

async fn handle<C: ApiController + ?Sized>(controller: &C, ctx: &mut HttpContext) -> Result<(), ControllerError> {
    let method = ctx.method().clone();
    if !controller.supports(&method) {
        return Err(unsupported_method(&method));
    }
    controller.on_load(ctx).await?;
    match method {
        Method::GET => controller.get(ctx).await,
        Method::POST => controller.post(ctx).await,
        Method::PUT => controller.put(ctx).await,
        Method::DELETE => controller.delete(ctx).await,
        Method::PATCH => controller.patch(ctx).await,
        other => Err(unsupported_method(&other)),
    }
}

pub(crate) async fn dispatch<C: ApiController + ?Sized>(controller: &C, kernel: Arc<AppKernel>, req: Request) -> Response {
    let dev = kernel.dev();
    let mut ctx = match HttpContext::from_request(kernel, req).await {
        Ok(ctx) => ctx,
        Err(e) => return rejected(&e),
    };

    ctx.response
        .content_type("application/json")
        .set("status", false)
        .set("message", Value::Null);

    if let Err(e) = handle(controller, &mut ctx).await {
        tracing::debug!(error = %e, kind = e.kind(), "api_controller_error");
        ctx.response.set("message", e.message());
        if let Some(param) = e.param_name() {
            ctx.response.set("param", param);
        }
        if dev {
            let details = e.details();
            ctx.response
                .set("caught", details["caught"].clone())
                .set("chain", details["chain"].clone());
        }
    }

    if dev {
        let errors = ctx.errors().display_errors();
        ctx.response.set("errors", json!(errors));
    }

    if ctx.has_session() {
        ctx.save_session().await;
    }
    controller.on_finish(&mut ctx).await;
    finished(&ctx);
    ctx.into_response()
}

/// Response for a request that could not be read into a context.
pub(crate) fn rejected(e: &ControllerError) -> Response {
    let mut response = HttpResponse::default();
    response.status = StatusCode::BAD_REQUEST;
    response
        .content_type("application/json")
        .set("status", false)
        .set("message", e.message());
    response.into_response()
}

pub(crate) fn finished(ctx: &HttpContext) {
    let payload = json!({
        "method": ctx.method().as_str(),
        "path": ctx.uri().path(),
        "status": ctx.response.status.as_u16(),
    });
    if let Err(e) = ctx.kernel().events().trigger(HTTP_REQUEST_FINISHED, &payload) {
        tracing::warn!(error = %e, "request_finished_event_failed");
    }
}
