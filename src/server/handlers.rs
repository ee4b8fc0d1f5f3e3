//! Request handlers for the web server.

use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::{info, warn};
use uuid::Uuid;

use super::templates::{DocumentView, ErrorTemplate, IndexTemplate, SessionTemplate};
use super::{AppState, UploadSession, UploadedDocument, SESSION_COOKIE};
use crate::extract::ocr_bytes;
use crate::session::{combined_text, SessionAggregator, COMBINED_FILE_NAME};

const TITLE: &str = "VLM OCR on PDFs";

pub async fn health() -> &'static str {
    "ok"
}

/// Upload form, with a link to the browser's current results if it has any.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut current = session_cookie(&headers);
    if let Some(id) = current {
        if state.live(&*state.sessions.read().await, &id).is_none() {
            current = None;
        }
    }
    let template = IndexTemplate {
        title: TITLE,
        endpoint: &state.config.endpoint,
        model: &state.config.model,
        has_session: current.is_some(),
        session_url: current.map(|id| format!("/sessions/{id}")).unwrap_or_default(),
    };
    render(template)
}

/// Accept one or more PDFs, OCR them in order, and redirect to the results.
///
/// The browser's previous session is discarded before processing starts.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_page(StatusCode::BAD_REQUEST, &e.body_text()),
        };
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        match field.bytes().await {
            Ok(bytes) if !bytes.is_empty() => files.push((name, bytes.to_vec())),
            Ok(_) => {}
            Err(e) => return error_page(StatusCode::BAD_REQUEST, &e.body_text()),
        }
    }

    if files.is_empty() {
        return error_page(StatusCode::BAD_REQUEST, "No PDF files were uploaded.");
    }

    if let Some(old) = session_cookie(&headers) {
        state.sessions.write().await.remove(&old);
    }

    info!("Processing upload of {} file(s)", files.len());
    let mut documents = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let size_bytes = bytes.len();
        let result = ocr_bytes(name.clone(), bytes, &state.config, state.client.as_ref())
            .await
            .map_err(|e| {
                warn!("Failed to process {}: {}", name, e);
                e.to_string()
            });
        documents.push(UploadedDocument {
            name,
            size_bytes,
            result,
        });
    }

    let id = state.insert_session(UploadSession::new(documents)).await;

    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    (
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&format!("/sessions/{id}")),
    )
        .into_response()
}

pub async fn session_view(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let Some(id) = parse_session_id(&session_id) else {
        return not_found();
    };
    let sessions = state.sessions.read().await;
    let Some(session) = state.live(&sessions, &id) else {
        return not_found();
    };

    let documents: Vec<DocumentView> = session
        .documents
        .iter()
        .enumerate()
        .map(|(i, doc)| DocumentView::new(id, i, doc))
        .collect();
    let total_pages = documents.iter().map(|d| d.page_count).sum();
    let has_results = session.aggregators().any(|a| a.results().next().is_some());

    render(SessionTemplate {
        title: TITLE,
        total_files: documents.len(),
        total_pages,
        documents,
        has_results,
        combined_url: format!("/sessions/{id}/combined"),
    })
}

pub async fn download_text(
    State(state): State<AppState>,
    Path((session_id, doc)): Path<(String, usize)>,
) -> Response {
    with_document(&state, &session_id, doc, |agg| {
        attachment(
            "text/plain; charset=utf-8",
            &agg.text_file_name(),
            agg.text(&state.config.page_separator),
        )
    })
    .await
}

pub async fn download_markdown(
    State(state): State<AppState>,
    Path((session_id, doc)): Path<(String, usize)>,
) -> Response {
    with_document(&state, &session_id, doc, |agg| {
        attachment(
            "text/markdown; charset=utf-8",
            &agg.markdown_file_name(),
            agg.markdown_report(),
        )
    })
    .await
}

pub async fn download_combined(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(id) = parse_session_id(&session_id) else {
        return not_found();
    };
    let sessions = state.sessions.read().await;
    match state.live(&sessions, &id) {
        Some(session) => attachment(
            "text/plain; charset=utf-8",
            COMBINED_FILE_NAME,
            combined_text(session.aggregators()),
        ),
        None => not_found(),
    }
}

/// The PNG that was sent to the model for one page.
pub async fn page_image(
    State(state): State<AppState>,
    Path((session_id, doc, page_file)): Path<(String, usize, String)>,
) -> Response {
    let Some(page_num) = page_file
        .strip_suffix(".png")
        .and_then(|n| n.parse::<usize>().ok())
    else {
        return not_found();
    };

    with_document(&state, &session_id, doc, |agg| {
        let preview = agg.entry(page_num).and_then(|e| e.preview.as_ref());
        match preview.map(|p| p.png_bytes()) {
            Some(Ok(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
            Some(Err(e)) => {
                warn!("Stored preview for page {} is not valid base64: {}", page_num, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Preview unavailable").into_response()
            }
            None => not_found(),
        }
    })
    .await
}

// ── Helpers ──────────────────────────────────────────────────────────────

async fn with_document<F>(state: &AppState, session_id: &str, doc: usize, f: F) -> Response
where
    F: FnOnce(&SessionAggregator) -> Response,
{
    let Some(id) = parse_session_id(session_id) else {
        return not_found();
    };
    let sessions = state.sessions.read().await;
    let agg = state
        .live(&sessions, &id)
        .and_then(|s| s.documents.get(doc))
        .and_then(|d| d.result.as_ref().ok());
    match agg {
        Some(agg) => f(agg),
        None => not_found(),
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

fn parse_session_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

/// Header values must be visible ASCII without quotes.
fn header_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

fn attachment(content_type: &'static str, file_name: &str, body: String) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", header_file_name(file_name));
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

fn render<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!("Template rendering failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

fn error_page(status: StatusCode, message: &str) -> Response {
    let mut response = render(ErrorTemplate {
        title: "Error",
        message,
    });
    *response.status_mut() = status;
    response
}

fn not_found() -> Response {
    error_page(StatusCode::NOT_FOUND, "Not found.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_found_among_others() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {SESSION_COOKIE}={id}; other=1")
                .parse()
                .unwrap(),
        );
        assert_eq!(session_cookie(&headers), Some(id));
    }

    #[test]
    fn malformed_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, format!("{SESSION_COOKIE}=garbage").parse().unwrap());
        assert_eq!(session_cookie(&headers), None);
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[test]
    fn header_file_name_replaces_unsafe_chars() {
        assert_eq!(header_file_name("ocr_a \"b\".pdf.md"), "ocr_a _b_.pdf.md");
        assert_eq!(header_file_name("ocr_résumé.pdf.txt"), "ocr_r_sum_.pdf.txt");
    }
}
