use std::fmt::Write;

use htmlescape::encode_minimal as escape_html;

use crate::application::error_handler::ErrorMsg;
use crate::bootstrap::kernel::VERSION;
use crate::presentation::http::controllers::ControllerError;

/// HTML page shown when a controller rendering HTML fails.
#[derive(Debug, Clone)]
pub struct ErrorScreen<'a> {
    dev: bool,
    site_title: &'a str,
}

impl<'a> ErrorScreen<'a> {
    pub fn new(dev: bool, site_title: &'a str) -> Self {
        Self { dev, site_title }
    }

    /// Development builds show the error, its sources and the error log;
    /// production only a generic notice.
    pub fn render(&self, error: &ControllerError, errors: &[ErrorMsg]) -> String {
        let mut body = String::new();
        if self.dev {
            let _ = write!(
                body,
                "<h1>{}</h1>\n<p class=\"message\">{}</p>\n",
                escape_html(error.kind()),
                escape_html(error.message())
            );
            if !error.chain().is_empty() {
                body.push_str("<h2>Caused by</h2>\n<ol class=\"chain\">\n");
                for cause in error.chain() {
                    let _ = writeln!(body, "<li>{}</li>", escape_html(cause));
                }
                body.push_str("</ol>\n");
            }
            if !errors.is_empty() {
                body.push_str("<h2>Errors</h2>\n<table class=\"errors\">\n");
                for e in errors {
                    let _ = writeln!(
                        body,
                        "<tr><td>{}</td><td>{}</td><td>{}:{}</td></tr>",
                        e.level,
                        escape_html(&e.message),
                        escape_html(&e.file),
                        e.line
                    );
                }
                body.push_str("</table>\n");
            }
            let _ = writeln!(body, "<footer>app-kernel {VERSION}</footer>");
        } else {
            body.push_str("<h1>An error occurred</h1>\n<p>Your request could not be completed. Please try again later.</p>\n");
        }

        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
            escape_html(self.site_title),
            body
        )
    }
}
