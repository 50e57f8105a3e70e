use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use http::{Method, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use crate::bootstrap::kernel::AppKernel;
use crate::presentation::http::context::HttpContext;
use crate::presentation::http::error_screen::ErrorScreen;

use super::ControllerError;
use super::api::{finished, rejected};

static ACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid regex"));

/// Page or form endpoint whose handler is picked per HTTP method and an
/// optional action named by the first query-string segment: `POST ?login`
/// calls `post_login`.
#[async_trait]
pub trait GenericHttpController: Send + Sync + 'static {
    /// Name shown when an action cannot be resolved.
    fn name(&self) -> &str;

    fn has_action(&self, action: &str) -> bool;

    async fn call(&self, action: &str, ctx: &mut HttpContext) -> Result<(), ControllerError>;

    async fn on_load(&self, _ctx: &mut HttpContext) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn on_finish(&self, _ctx: &mut HttpContext) {}
}

/// Picks the action for `method`, falling back from an unknown explicit GET
/// action to `get`. The error carries the unresolved action name.
pub fn resolve_action(method: &Method, query: Option<&str>, has: impl Fn(&str) -> bool) -> Result<String, String> {
    let method = method.as_str().to_lowercase();
    let explicit = query
        .and_then(|q| q.split('&').next())
        .filter(|segment| ACTION_RE.is_match(segment))
        .map(snake_case);

    match explicit {
        Some(action) => {
            let candidate = format!("{method}_{action}");
            if has(&candidate) {
                Ok(candidate)
            } else if method == "get" && has("get") {
                Ok(method)
            } else {
                Err(candidate)
            }
        }
        None if has(&method) => Ok(method),
        None => Err(method),
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolves the action before `on_load`, so unknown actions never load.
async fn handle<C: GenericHttpController + ?Sized>(controller: &C, ctx: &mut HttpContext) -> Result<(), ControllerError> {
    let action = resolve_action(ctx.method(), ctx.uri().query(), |a| controller.has_action(a))
        .map_err(|action| {
            ControllerError::new(format!(
                "Requested method \"{action}\" not found in HTTP controller \"{}\"",
                controller.name()
            ))
        })?;
    tracing::debug!(controller = controller.name(), action = %action, "http_controller_action");
    controller.on_load(ctx).await?;
    controller.call(&action, ctx).await
}

pub(crate) async fn dispatch<C: GenericHttpController + ?Sized>(controller: &C, kernel: Arc<AppKernel>, req: Request) -> Response {
    let dev = kernel.dev();
    let site_title = kernel.config().site().title.clone();
    let mut ctx = match HttpContext::from_request(kernel, req).await {
        Ok(ctx) => ctx,
        Err(e) => return rejected(&e),
    };

    ctx.response
        .content_type("application/json")
        .set("status", false)
        .set("messages", Value::Null);

    if let Err(e) = handle(controller, &mut ctx).await {
        tracing::debug!(error = %e, kind = e.kind(), "http_controller_error");
        if ctx.response.is_html() {
            let errors = ctx.errors().display_errors();
            let screen = ErrorScreen::new(dev, &site_title).render(&e, &errors);
            ctx.response.status = StatusCode::INTERNAL_SERVER_ERROR;
            ctx.response.set_body(screen);
        } else {
            ctx.messages().danger(e.message(), e.param_name());
            if dev {
                let details = e.details();
                ctx.response
                    .set("caught", details["caught"].clone())
                    .set("chain", details["chain"].clone());
            }
        }
    }

    let messages = json!(ctx.messages().as_slice());
    ctx.response.set("messages", messages);
    let errors = ctx.errors().display_errors();
    if !errors.is_empty() {
        ctx.response.set("errors", json!(errors));
    }

    if ctx.has_session() {
        ctx.save_session().await;
    }
    controller.on_finish(&mut ctx).await;
    finished(&ctx);
    ctx.into_response()
}
