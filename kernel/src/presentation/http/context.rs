//! Per-request state handed to controllers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request};
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use crate::application::error_handler::{ErrorHandler, ErrorLevel};
use crate::application::memory::Memory;
use crate::bootstrap::error::KernelError;
use crate::bootstrap::kernel::AppKernel;
use crate::domain::messages::Messages;
use crate::domain::session::Session;
use crate::presentation::http::controllers::ControllerError;
use crate::presentation::http::cookies::Cookies;
use crate::presentation::http::page::Page;
use crate::presentation::http::remote::Remote;
use crate::presentation::http::security::{Forms, ObfuscatedForm, Xsrf};

const BODY_LIMIT: usize = 2 * 1024 * 1024;
const FLASH_MESSAGES: &str = "messages";

/// Outgoing response being assembled by a controller.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    payload: Map<String, Value>,
    body: Option<String>,
    cookies: Vec<String>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            payload: Map::new(),
            body: None,
            cookies: Vec::new(),
        }
    }
}

impl HttpResponse {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(&mut self, value: &'static str) -> &mut Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(value));
        self
    }

    pub fn is_html(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"))
    }

    pub fn cookie(&mut self, set_cookie: String) -> &mut Self {
        self.cookies.push(set_cookie);
        self
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            Some(body) => Body::from(body),
            None => Body::from(Value::Object(self.payload).to_string()),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        for cookie in self.cookies {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "invalid_set_cookie_header"),
            }
        }
        response
    }
}

/// Everything scoped to one request: remote peer, input, error log,
/// session, messages, page and the response under construction.
pub struct HttpContext {
    kernel: Arc<AppKernel>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    input: Map<String, Value>,
    remote: Remote,
    errors: ErrorHandler,
    pub response: HttpResponse,
    session: Option<Session>,
    session_cookie: Option<String>,
    messages: Messages,
    flash: Option<Messages>,
    page: Option<Page>,
    memory: Option<Memory>,
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote", &self.remote)
            .field("session", &self.session.as_ref().map(Session::id))
            .finish_non_exhaustive()
    }
}

impl HttpContext {
    /// Reads the request head and body. Input is the query string, overlaid
    /// by a JSON or url-encoded form body.
    pub async fn from_request(kernel: Arc<AppKernel>, req: Request) -> Result<Self, ControllerError> {
        let (parts, body) = req.into_parts();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let remote = kernel.http().remote(&parts.headers, peer);

        let mut input = parts.uri.query().map(parse_urlencoded).unwrap_or_default();
        let bytes = to_bytes(body, BODY_LIMIT)
            .await
            .map_err(|_| ControllerError::new("Failed to read request body"))?;
        if !bytes.is_empty() {
            let content_type = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if content_type.starts_with("application/json") {
                match serde_json::from_slice::<Value>(&bytes) {
                    Ok(Value::Object(map)) => input.extend(map),
                    Ok(_) => {}
                    Err(_) => return Err(ControllerError::new("Invalid JSON request body")),
                }
            } else if content_type.starts_with("application/x-www-form-urlencoded") {
                input.extend(parse_urlencoded(&String::from_utf8_lossy(&bytes)));
            }
        }

        let errors = kernel.error_handler().scoped();
        Ok(Self {
            kernel,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            input,
            remote,
            errors,
            response: HttpResponse::default(),
            session: None,
            session_cookie: None,
            messages: Messages::default(),
            flash: None,
            page: None,
            memory: None,
        })
    }

    pub fn kernel(&self) -> &Arc<AppKernel> {
        &self.kernel
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.errors
    }

    pub fn messages(&mut self) -> &mut Messages {
        &mut self.messages
    }

    /// Resumes session `id`, or the one named by the sessions cookie when no
    /// id is given, or starts a new one. With `set_cookie`, a session found
    /// through the cookie has its id sent back.
    pub async fn init_session(&mut self, id: Option<&str>, set_cookie: bool) -> Result<(), ControllerError> {
        if self.session.is_some() {
            return Err(ControllerError::new("Session already initialized"));
        }

        let cookie_name = match id {
            Some(_) => None,
            None => Some(
                self.kernel
                    .config()
                    .services()
                    .sessions()
                    .and_then(|s| s.cookie.clone())
                    .ok_or_else(|| ControllerError::new("Sessions cookie name not configured"))?,
            ),
        };
        let from_cookie = cookie_name
            .as_deref()
            .and_then(|name| Cookies::get(&self.headers, name));

        let session = self
            .kernel
            .session_with(id.or(from_cookie.as_deref()), &self.errors)
            .await?;

        if set_cookie {
            self.session_cookie = cookie_name;
        }
        self.session = Some(session);
        Ok(())
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&mut self) -> Result<&mut Session, ControllerError> {
        self.session
            .as_mut()
            .ok_or_else(|| ControllerError::new("Session not instantiated"))
    }

    pub fn xsrf(&mut self) -> Result<Xsrf<'_>, ControllerError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ControllerError::new("XSRF requires session instantiated"))?;
        Ok(Xsrf::new(session, self.remote.ip_address.as_deref()))
    }

    pub fn forms(&mut self) -> Result<Forms<'_>, ControllerError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ControllerError::new("Obfuscated forms require session instantiated"))?;
        Ok(Forms::new(session, &self.errors))
    }

    /// Retrieves form `name` with the request input attached, checking the
    /// submitted `hash_field` against the form hash.
    pub fn obfuscated_form(&mut self, name: &str, hash_field: Option<&str>) -> Result<ObfuscatedForm, ControllerError> {
        let mut form = self
            .forms()?
            .retrieve(name)?
            .ok_or_else(|| ControllerError::new("Secure obfuscated form not found; Try refreshing the page"))?;
        form.input(self.input.clone());

        if let Some(field) = hash_field {
            let submitted = form.value(field).and_then(Value::as_str).unwrap_or_default();
            let matches: bool = submitted
                .to_lowercase()
                .as_bytes()
                .ct_eq(form.hash().as_bytes())
                .into();
            if !matches {
                return Err(ControllerError::new("Invalid obfuscated form hash").param(field));
            }
        }
        Ok(form)
    }

    /// Messages carried over to the next request through the session flash.
    pub fn flash_messages(&mut self) -> Result<&mut Messages, ControllerError> {
        if self.session.is_none() {
            return Err(ControllerError::new("Flash messages require session instantiated"));
        }
        Ok(self.flash.get_or_insert_with(Messages::default))
    }

    /// Flash messages stored by the previous request.
    pub fn flash_messages_last(&self) -> Messages {
        let Some(stored) = self
            .session
            .as_ref()
            .and_then(|s| s.flash().last().get(FLASH_MESSAGES).cloned())
        else {
            return Messages::default();
        };
        match serde_json::from_value(stored) {
            Ok(messages) => messages,
            Err(e) => {
                self.errors.trigger(
                    format!("Failed to unserialize flash messages: {e}"),
                    ErrorLevel::Warning,
                );
                Messages::default()
            }
        }
    }

    /// Template model. The token is the current XSRF token or a new
    /// IP-bound one, so a session is required.
    pub fn page(&mut self) -> Result<&mut Page, ControllerError> {
        if let Some(page) = self.page.take() {
            return Ok(self.page.insert(page));
        }
        let token = {
            let mut xsrf = self.xsrf()?;
            match xsrf.token() {
                Some(token) => token,
                None => xsrf.generate(None, true),
            }
        };
        let root = self.kernel.config().site().url.clone();
        Ok(self.page.insert(Page::new(root, Some(token))))
    }

    /// Run-time object memory scoped to this request.
    pub async fn memory(&mut self) -> &Memory {
        let memory = match self.memory.take() {
            Some(memory) => memory,
            None => self.kernel.memory(&self.errors).await,
        };
        self.memory.insert(memory)
    }

    /// Visitor language read from the translator cookie, if one is configured.
    pub fn language(&self) -> Option<String> {
        let translator = self.kernel.services().translator().ok()?;
        Cookies::get(&self.headers, translator.cookie_name()?)
    }

    /// Translates `key` into the visitor language, then the fallback language.
    pub fn translate(&self, key: &str) -> Result<Option<String>, ControllerError> {
        let translator = self.kernel.services().translator()?;
        Ok(translator.translate(key, self.language().as_deref()))
    }

    pub fn html(&mut self, body: impl Into<String>) {
        self.response
            .content_type("text/html; charset=utf-8")
            .set_body(body);
    }

    /// Stores flash messages, then points the client at `url`.
    pub fn redirect(&mut self, url: &str, code: Option<u16>) -> Result<(), ControllerError> {
        self.store_flash();
        let status = StatusCode::from_u16(code.unwrap_or(302))
            .map_err(|_| ControllerError::new("Invalid HTTP redirect code"))?;
        let location = HeaderValue::from_str(url)
            .map_err(|_| ControllerError::new("Invalid redirect URL"))?;
        self.response.status = status;
        self.response.headers.insert(LOCATION, location);
        Ok(())
    }

    pub(crate) fn store_flash(&mut self) {
        let (Some(session), Some(flash)) = (self.session.as_mut(), self.flash.take()) else {
            return;
        };
        match serde_json::to_value(&flash) {
            Ok(encoded) => {
                session.flash_mut().current_mut().set(FLASH_MESSAGES, encoded);
            }
            Err(e) => self.errors.error_to_warning("JsonException", &e),
        }
    }

    /// Persists the session and queues its cookie.
    pub(crate) async fn save_session(&mut self) {
        self.store_flash();
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let saved = match self.kernel.services().sessions() {
            Ok(store) => store.save(session).await.map_err(KernelError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            self.errors.error_to_warning(e.kind(), &e);
            return;
        }

        if let Some(name) = &self.session_cookie {
            let cookies = self.kernel.http().cookies_or_default();
            let cookie = cookies.set(name, session.id());
            self.response.cookie(cookie);
        }
    }

    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}

fn parse_urlencoded(raw: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let decode = |s: &str| {
            let s = s.replace('+', " ");
            urlencoding::decode(&s)
                .map(|d| d.into_owned())
                .unwrap_or(s)
        };
        out.insert(decode(k), Value::String(decode(v)));
    }
    out
}
