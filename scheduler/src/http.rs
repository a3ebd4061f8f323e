//! HTTP ingress (§4.4 "HTTP wiring (ambient)", §6): a thin hyper router in front of the
//! [`IngestPipeline`], matching the teacher's `router`/`ioxd_common` stack (method+path
//! dispatch, a CORS layer applied to every response, and a small logging wrapper around
//! each request, in place of the teacher's `trace_http::tower::TraceLayer` since this
//! core has no cross-service trace collector to propagate context to).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use observability_deps::tracing::{info, warn};
use serde::Deserialize;

use crate::ingest::IngestPipeline;

const UPLOAD_FIELD_NAME: &str = "file";

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    name: String,
}

#[derive(Debug)]
pub struct HttpServer {
    pipeline: Arc<IngestPipeline>,
}

impl HttpServer {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Bind and serve until `shutdown` resolves, then stop accepting new connections and
    /// let in-flight ones finish (the process wraps this in a bounded grace, §5).
    pub async fn serve_with_shutdown(
        self,
        addr: SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> hyper::Result<()> {
        let pipeline = self.pipeline;
        let make_svc = make_service_fn(move |_conn| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let pipeline = Arc::clone(&pipeline);
                    async move { Ok::<_, Infallible>(dispatch(pipeline, req).await) }
                }))
            }
        });
        info!(%addr, "HTTP ingress listening");
        Server::bind(&addr)
            .serve(make_svc)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn dispatch(pipeline: Arc<IngestPipeline>, req: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => health(),
        (&Method::POST, "/files/uploadFile") => upload(&pipeline, req).await,
        (&Method::GET, "/files/getFile") => download(&pipeline, req).await,
        (&Method::OPTIONS, _) => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .expect("static response is well-formed"),
        _ => not_found(),
    };

    apply_cors(&mut response);
    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http request"
    );
    response
}

/// `*` origins/headers, the method set of §6, credentials disabled (§6).
fn apply_cors(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert("access-control-allow-headers", HeaderValue::from_static("*"));
}

fn health() -> Response<Body> {
    Response::new(Body::from("ok"))
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from("not found"))
        .expect("static response is well-formed")
}

fn bad_request(message: String) -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .body(Body::from(message))
        .expect("static response is well-formed")
}

fn server_error(message: String) -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from(message))
        .expect("static response is well-formed")
}

async fn upload(pipeline: &IngestPipeline, req: Request<Body>) -> Response<Body> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let boundary = match multer::parse_boundary(&content_type) {
        Ok(boundary) => boundary,
        Err(e) => return bad_request(format!("not a multipart request: {e}")),
    };

    let mut multipart = multer::Multipart::new(req.into_body(), boundary);
    let mut filename = None;
    let mut bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD_NAME) => {
                filename = field.file_name().map(str::to_string);
                bytes = match field.bytes().await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => return bad_request(format!("could not read upload body: {e}")),
                };
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed multipart body: {e}")),
        }
    }

    let (Some(filename), Some(bytes)) = (filename, bytes) else {
        return bad_request("missing required 'file' field".to_string());
    };

    match pipeline.upload(&filename, &bytes).await {
        Ok(chunk_count) => {
            Response::new(Body::from(format!("Upload successful. Total chunks sent: {chunk_count}")))
        }
        Err(e) => {
            warn!(error = %e, filename, "upload failed");
            server_error(e.to_string())
        }
    }
}

async fn download(pipeline: &IngestPipeline, req: Request<Body>) -> Response<Body> {
    let query: DownloadQuery = match serde_urlencoded::from_str(req.uri().query().unwrap_or_default()) {
        Ok(query) => query,
        Err(_) => return bad_request("missing 'name' query parameter".to_string()),
    };

    match pipeline.download(&query.name).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(
                "content-disposition",
                format!("attachment; filename={}", query.name),
            )
            .body(Body::from(bytes))
            .expect("response with controlled headers is well-formed"),
        Err(e @ crate::ingest::IngestError::NotFound { .. }) => {
            Response::builder().status(StatusCode::NOT_FOUND).body(Body::from(e.to_string())).expect("static response is well-formed")
        }
        Err(e) => {
            warn!(error = %e, filename = query.name, "download failed");
            server_error(e.to_string())
        }
    }
}
