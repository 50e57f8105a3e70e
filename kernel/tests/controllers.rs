use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use app_kernel::application::ports::session_store::SessionStore;
use app_kernel::bootstrap::bootstrapper::Bootstrapper;
use app_kernel::bootstrap::kernel::AppKernel;
use app_kernel::presentation::http::context::HttpContext;
use app_kernel::presentation::http::controllers::{
    ApiController, ControllerError, GenericHttpController, api_route, http_route,
};
use app_kernel::presentation::http::router;
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::response::Response;
use http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const CONFIG: &str = r#"
time_zone: Asia/Tokyo
site:
  title: Controllers
  domain: controllers.test
  https: false
services:
  sessions:
    cookie: SESSID
  http:
    cookies:
      expire: 3600
      path: /
      secure: false
      http_only: true
"#;

struct Echo {
    loads: Arc<AtomicUsize>,
}

#[async_trait]
impl ApiController for Echo {
    fn supports(&self, method: &Method) -> bool {
        *method == Method::GET
    }

    async fn on_load(&self, _ctx: &mut HttpContext) -> Result<(), ControllerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        let name = ctx
            .input()
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ControllerError::new("Name is required").param("name"))?
            .to_string();
        ctx.response.set("status", true).set("hello", name);
        Ok(())
    }
}

struct Account {
    loads: Arc<AtomicUsize>,
}

#[async_trait]
impl GenericHttpController for Account {
    fn name(&self) -> &str {
        "Account"
    }

    fn has_action(&self, action: &str) -> bool {
        matches!(
            action,
            "get" | "get_page" | "get_view" | "post_save" | "post_form" | "post_garble"
        )
    }

    async fn on_load(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        ctx.init_session(None, true).await
    }

    async fn call(&self, action: &str, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        match action {
            "get" => {
                let token = ctx.xsrf()?.generate(None, true);
                let last = ctx.flash_messages_last();
                ctx.response
                    .set("status", true)
                    .set("token", token)
                    .set("flash", json!(last.as_slice()));
                Ok(())
            }
            "get_view" => {
                let token = ctx.page()?.get("token").cloned();
                ctx.response.set("status", true).set("token", token);
                Ok(())
            }
            "post_garble" => {
                ctx.session()?
                    .flash_mut()
                    .current_mut()
                    .set("messages", "not a message list");
                ctx.response.set("status", true);
                Ok(())
            }
            "get_page" => {
                ctx.html("<p>page</p>");
                Err(ControllerError::new("Template \"missing.knit\" not found"))
            }
            "post_save" => {
                let token = ctx
                    .input()
                    .get("xsrf")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ctx.xsrf()?.verify(&token)?;
                ctx.flash_messages()?.success("Saved", None);
                ctx.redirect("/account", None)
            }
            _ => {
                let form = ctx.obfuscated_form("signup", Some("hash"))?;
                ctx.response.set("status", true).set("email", form.value("email").cloned());
                Ok(())
            }
        }
    }
}

/// Reads the session id from input and resumes it without touching cookies.
struct Resume;

#[async_trait]
impl ApiController for Resume {
    fn supports(&self, method: &Method) -> bool {
        *method == Method::POST
    }

    async fn post(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        let id = ctx
            .input()
            .get("session")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ctx.init_session(Some(&id), true).await?;
        let resumed = ctx.session()?.id() == id;
        ctx.response.set("status", true).set("resumed", resumed);
        Ok(())
    }
}

struct Greeting;

#[async_trait]
impl ApiController for Greeting {
    fn supports(&self, method: &Method) -> bool {
        *method == Method::GET
    }

    async fn get(&self, ctx: &mut HttpContext) -> Result<(), ControllerError> {
        let text = ctx.translate("greeting.hello")?;
        let language = ctx.language();
        ctx.response
            .set("status", true)
            .set("language", language)
            .set("text", text);
        Ok(())
    }
}

fn kernel(dev: bool) -> (TempDir, Arc<AppKernel>) {
    kernel_with(CONFIG, dev)
}

fn kernel_with(config: &str, dev: bool) -> (TempDir, Arc<AppKernel>) {
    let tmp = TempDir::new().unwrap();
    for d in ["config/env", "cache", "sessions", "storage", "langs", "logs"] {
        std::fs::create_dir_all(tmp.path().join(d)).unwrap();
    }
    std::fs::write(tmp.path().join("config/env/web.yml"), config).unwrap();
    let bs = Bootstrapper::new(tmp.path())
        .unwrap()
        .env("web")
        .unwrap()
        .dev(dev);
    let kernel = AppKernel::build(bs).unwrap();
    (tmp, kernel)
}

fn app(kernel: Arc<AppKernel>) -> Router {
    app_counting(kernel, Arc::new(AtomicUsize::new(0)))
}

fn app_counting(kernel: Arc<AppKernel>, loads: Arc<AtomicUsize>) -> Router {
    router(
        kernel,
        Router::new()
            .route("/api/echo", api_route(Echo { loads: loads.clone() }))
            .route("/api/resume", api_route(Resume))
            .route("/api/greeting", api_route(Greeting))
            .route("/account", http_route(Account { loads })),
    )
}

async fn json_body(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(res: &Response) -> String {
    let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn api_controller_envelope() {
    let (_tmp, kernel) = kernel(false);
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(Request::get("/api/echo?name=Ana").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
    let body = json_body(res).await;
    assert_eq!(body["status"], true);
    assert_eq!(body["hello"], "Ana");
    assert_eq!(body["message"], Value::Null);
    assert!(body.get("errors").is_none());

    let res = app
        .clone()
        .oneshot(Request::get("/api/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["status"], false);
    assert_eq!(body["message"], "Name is required");
    assert_eq!(body["param"], "name");
    assert!(body.get("caught").is_none());

    let res = app
        .oneshot(
            Request::post("/api/echo")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"Ana"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["message"], "Endpoint does not support POST method");
}

#[tokio::test]
async fn dev_mode_adds_details() {
    let (_tmp, kernel) = kernel(true);
    let res = app(kernel)
        .oneshot(Request::delete("/api/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["caught"], "AppControllerException");
    assert!(body["errors"].is_array());
}

#[tokio::test]
async fn xsrf_round_trip_with_flash_messages() {
    let (_tmp, kernel) = kernel(false);
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(Request::get("/account").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = session_cookie(&res);
    assert!(cookie.starts_with("SESSID="));
    let body = json_body(res).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 40);

    let res = app
        .clone()
        .oneshot(
            Request::post("/account?save")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("xsrf=0000"))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["status"], false);
    assert_eq!(
        body["messages"][0]["message"],
        "XSRF token does not match; Possible CSRF/XSRF breach attempt"
    );
    assert_eq!(body["messages"][0]["type"], "danger");

    let res = app
        .clone()
        .oneshot(
            Request::post("/account?save")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"xsrf": token}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[header::LOCATION], "/account");

    let res = app
        .oneshot(
            Request::get("/account")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(session_cookie(&res), cookie);
    let body = json_body(res).await;
    assert_eq!(body["flash"][0]["message"], "Saved");
    assert_eq!(body["flash"][0]["type"], "success");
}

#[tokio::test]
async fn unknown_actions_and_missing_forms() {
    let (_tmp, kernel) = kernel(false);
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(Request::post("/account?delete").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(
        body["messages"][0]["message"],
        "Requested method \"post_delete\" not found in HTTP controller \"Account\""
    );

    let res = app
        .oneshot(Request::post("/account?form").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(
        body["messages"][0]["message"],
        "Secure obfuscated form not found; Try refreshing the page"
    );
}

#[tokio::test]
async fn html_failures_render_error_screen() {
    let (_tmp, kernel) = kernel(false);
    let res = app(kernel)
        .oneshot(Request::get("/account?page").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<title>Controllers</title>"));
    assert!(!html.contains("missing.knit"));
}

#[tokio::test]
async fn builtin_endpoints() {
    let (_tmp, kernel) = kernel(false);
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["status"], "ok");

    let res = app
        .oneshot(Request::get("/kernel").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let (_tmp, kernel) = crate::kernel(true);
    let res = crate::app(kernel)
        .oneshot(Request::get("/kernel").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["env"], "web");
    assert_eq!(body["time_zone"], "Asia/Tokyo");
}

#[tokio::test]
async fn unresolved_requests_skip_on_load() {
    let (_tmp, kernel) = kernel(false);
    let loads = Arc::new(AtomicUsize::new(0));
    let app = app_counting(kernel, loads.clone());

    let res = app
        .clone()
        .oneshot(Request::post("/account?nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(
        body["messages"][0]["message"],
        "Requested method \"post_nope\" not found in HTTP controller \"Account\""
    );

    let res = app
        .clone()
        .oneshot(Request::put("/api/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["message"], "Endpoint does not support PUT method");
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    app.oneshot(Request::get("/api/echo?name=Ana").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_tokens_are_bound_to_the_issuing_ip() {
    let (_tmp, kernel) = kernel(false);
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(
            Request::get("/account?view")
                .header("x-forwarded-for", "203.0.113.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let cookie = session_cookie(&res);
    let body = json_body(res).await;
    let token = body["token"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(
            Request::post("/account?save")
                .header(header::COOKIE, &cookie)
                .header("x-forwarded-for", "198.51.100.9")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"xsrf": token}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["status"], false);
    assert_eq!(
        body["messages"][0]["message"],
        "XSRF token is IP sensitive; IP address \"198.51.100.9\" is not authorized"
    );

    let res = app
        .oneshot(
            Request::post("/account?save")
                .header(header::COOKIE, &cookie)
                .header("x-forwarded-for", "203.0.113.5")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"xsrf": token}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn explicit_session_ids_set_no_cookie() {
    let (_tmp, kernel) = kernel_with(&CONFIG.replace("cookie: SESSID", "cookie: ~"), false);
    let app = app(kernel.clone());

    let existing = kernel.session(None).await.unwrap();
    kernel.services().sessions().unwrap().save(&existing).await.unwrap();

    let res = app
        .clone()
        .oneshot(
            Request::post("/api/resume")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"session": existing.id()}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    let body = json_body(res).await;
    assert_eq!(body["status"], true);
    assert_eq!(body["resumed"], true);

    let res = app
        .oneshot(Request::get("/account").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["messages"][0]["message"], "Sessions cookie name not configured");
}

#[tokio::test]
async fn translations_follow_the_language_cookie() {
    let config = format!("{CONFIG}  translator:\n    cookie: lang\n    fallback: en\n    caching: false\n");
    let (tmp, kernel) = kernel_with(&config, false);
    std::fs::write(tmp.path().join("langs/en.yml"), "greeting:\n  hello: Hello\n").unwrap();
    std::fs::write(tmp.path().join("langs/de.yml"), "greeting:\n  hello: Hallo\n").unwrap();
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(
            Request::get("/api/greeting")
                .header(header::COOKIE, "lang=de")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["language"], "de");
    assert_eq!(body["text"], "Hallo");

    let res = app
        .oneshot(Request::get("/api/greeting").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["language"], Value::Null);
    assert_eq!(body["text"], "Hello");
}

#[tokio::test]
async fn undecodable_flash_messages_warn() {
    let (_tmp, kernel) = kernel(false);
    let app = app(kernel);

    let res = app
        .clone()
        .oneshot(Request::post("/account?garble").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let res = app
        .oneshot(
            Request::get("/account")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["status"], true);
    assert_eq!(body["flash"], json!([]));
    let warning = body["errors"][0]["message"].as_str().unwrap();
    assert!(warning.starts_with("Failed to unserialize flash messages"));
}
