//! In-process libpod API fake served with hyper over any byte stream

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use podwire_client::body::{self, ChannelBody, RequestBody};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;

const PREFIX: &str = "/v5.0.0/libpod/";

/// Image the fake registry can serve
#[derive(Debug, Clone)]
pub struct FakeImage {
    pub id: String,
    /// Credentials the registry demands, if any
    pub credentials: Option<(String, String)>,
    /// Progress lines sent before the completion event
    pub progress_lines: usize,
}

/// One request as the fake saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: http::HeaderMap,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
    running: bool,
}

#[derive(Default)]
struct State {
    next_id: u64,
    containers: Vec<FakeContainer>,
    images: HashMap<String, FakeImage>,
    networks: HashMap<String, Value>,
    secrets: HashMap<String, (String, String)>,
    archives: HashMap<String, Vec<u8>>,
    requests: Vec<RecordedRequest>,
}

impl State {
    fn new_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}{:060x}", &kind[..4], self.next_id)
    }

    fn container_mut(&mut self, name_or_id: &str) -> Option<&mut FakeContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == name_or_id || c.name == name_or_id)
    }
}

/// Fake Podman API
#[derive(Default)]
pub struct FakePodman {
    state: Mutex<State>,
    pull_delay: Mutex<Option<Duration>>,
}

fn json_response(status: StatusCode, value: Value) -> Response<RequestBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(body::full(value.to_string()))
        .unwrap()
}

fn text_response(status: StatusCode, text: &str) -> Response<RequestBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body::full(text.to_string()))
        .unwrap()
}

fn empty_response(status: StatusCode) -> Response<RequestBody> {
    Response::builder()
        .status(status)
        .body(body::empty())
        .unwrap()
}

fn error_response(status: StatusCode, message: &str) -> Response<RequestBody> {
    json_response(
        status,
        json!({ "cause": message, "message": message, "response": status.as_u16() }),
    )
}

fn query_params(request: &Request<Incoming>) -> HashMap<String, String> {
    url::form_urlencoded::parse(request.uri().query().unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn content_type(request: &Request<Incoming>) -> String {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn read_body(request: Request<Incoming>) -> Bytes {
    request
        .into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default()
}

impl FakePodman {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_image(&self, reference: &str, image: FakeImage) {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(reference.to_string(), image);
    }

    /// Pause between pull stream events
    pub fn set_pull_delay(&self, delay: Duration) {
        *self.pull_delay.lock().unwrap() = Some(delay);
    }

    pub fn add_container(&self, name: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.new_id("cont");
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: "docker.io/library/alpine:3".to_string(),
            running,
        });
        id
    }

    pub fn container_running(&self, name_or_id: &str) -> Option<bool> {
        self.state
            .lock()
            .unwrap()
            .container_mut(name_or_id)
            .map(|c| c.running)
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Bytes uploaded to a container's archive endpoint
    pub fn archive(&self, name_or_id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter()
            .find(|c| c.id == name_or_id || c.name == name_or_id)?;
        state.archives.get(&container.id).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Serve HTTP/1 on one established stream until the peer hangs up
    pub async fn serve<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let service = service_fn(move |request| {
            let api = self.clone();
            async move { Ok::<_, Infallible>(api.handle(request).await) }
        });

        let _ = hyper::server::conn::http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await;
    }

    /// Accept TCP connections on an ephemeral port
    pub async fn listen_tcp(self: Arc<Self>) -> (SocketAddr, JoinHandle<()>) {
        self.listen_tcp_on("127.0.0.1:0").await.unwrap()
    }

    /// Accept TCP connections on `bind`
    pub async fn listen_tcp_on(
        self: Arc<Self>,
        bind: &str,
    ) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(self.clone().serve(stream));
            }
        });
        Ok((addr, task))
    }

    /// Accept connections on a Unix socket at `path`
    pub fn listen_unix(self: Arc<Self>, path: &Path) -> JoinHandle<()> {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(self.clone().serve(stream));
            }
        })
    }

    async fn handle(self: Arc<Self>, request: Request<Incoming>) -> Response<RequestBody> {
        let path = request.uri().path().to_string();
        self.state.lock().unwrap().requests.push(RecordedRequest {
            method: request.method().clone(),
            path_and_query: request
                .uri()
                .path_and_query()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            headers: request.headers().clone(),
        });

        let Some(rest) = path.strip_prefix(PREFIX) else {
            return text_response(StatusCode::NOT_FOUND, "not a libpod path");
        };
        let segments: Vec<String> = rest
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let method = request.method().clone();

        match (method, segments.as_slice()) {
            (Method::GET, ["_ping"]) => text_response(StatusCode::OK, "OK"),
            (Method::GET, ["_test", "text"]) => text_response(StatusCode::OK, "{\"not\":\"json\"}"),
            (Method::GET, ["_test", "failure"]) => {
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "  storage is full\n\n")
            }
            (Method::GET, ["_test", "garbage"]) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .body(body::full("{not json"))
                .unwrap(),

            (Method::POST, ["containers", "create"]) => self.create_container(request).await,
            (Method::GET, ["containers", name, "json"]) => self.inspect_container(name),
            (Method::POST, ["containers", name, "rename"]) => {
                let new_name = query_params(&request).remove("name").unwrap_or_default();
                let mut state = self.state.lock().unwrap();
                match state.container_mut(name) {
                    Some(c) => {
                        c.name = new_name;
                        empty_response(StatusCode::NO_CONTENT)
                    }
                    None => error_response(StatusCode::NOT_FOUND, "no such container"),
                }
            }
            (Method::POST, ["containers", name, action @ ("start" | "stop")]) => {
                let want_running = *action == "start";
                let mut state = self.state.lock().unwrap();
                match state.container_mut(name) {
                    Some(c) if c.running == want_running => empty_response(StatusCode::NOT_MODIFIED),
                    Some(c) => {
                        c.running = want_running;
                        empty_response(StatusCode::NO_CONTENT)
                    }
                    None => error_response(StatusCode::NOT_FOUND, "no such container"),
                }
            }
            (Method::DELETE, ["containers", name]) => {
                let mut state = self.state.lock().unwrap();
                let before = state.containers.len();
                let name = name.to_string();
                state.containers.retain(|c| c.id != name && c.name != name);
                if state.containers.len() == before {
                    error_response(StatusCode::NOT_FOUND, "no such container")
                } else {
                    json_response(StatusCode::OK, json!([{ "Id": name }]))
                }
            }
            (Method::PUT, ["containers", name, "archive"]) => {
                let name = name.to_string();
                self.upload_archive(&name, request).await
            }

            (Method::POST, ["images", "pull"]) => self.pull(request),
            (Method::GET, ["images", name, "json"]) => {
                let state = self.state.lock().unwrap();
                match state
                    .images
                    .iter()
                    .find(|(reference, image)| reference == name || image.id == *name)
                {
                    Some((reference, image)) => json_response(
                        StatusCode::OK,
                        json!({ "Id": image.id, "RepoTags": [reference] }),
                    ),
                    None => error_response(StatusCode::NOT_FOUND, "no such image"),
                }
            }
            (Method::DELETE, ["images", name]) => {
                let mut state = self.state.lock().unwrap();
                let name = name.to_string();
                let before = state.images.len();
                state
                    .images
                    .retain(|reference, image| reference != &name && image.id != name);
                if state.images.len() == before {
                    error_response(StatusCode::NOT_FOUND, "no such image")
                } else {
                    json_response(StatusCode::OK, json!({ "Deleted": [name] }))
                }
            }

            (Method::POST, ["networks", "create"]) => self.create_network(request).await,
            (Method::GET, ["networks", name, "json"]) => {
                let state = self.state.lock().unwrap();
                match state
                    .networks
                    .values()
                    .find(|n| n["name"] == *name || n["id"] == *name)
                {
                    Some(network) => json_response(StatusCode::OK, network.clone()),
                    None => error_response(StatusCode::NOT_FOUND, "network not found"),
                }
            }
            (Method::DELETE, ["networks", name]) => {
                let mut state = self.state.lock().unwrap();
                let name = name.to_string();
                let before = state.networks.len();
                state
                    .networks
                    .retain(|_, n| n["name"] != name.as_str() && n["id"] != name.as_str());
                if state.networks.len() == before {
                    error_response(StatusCode::NOT_FOUND, "network not found")
                } else {
                    json_response(StatusCode::OK, json!([{ "Name": name }]))
                }
            }

            (Method::POST, ["secrets", "create"]) => self.create_secret(request).await,
            (Method::GET, ["secrets", name, "json"]) => {
                let state = self.state.lock().unwrap();
                match state
                    .secrets
                    .iter()
                    .find(|(id, (secret_name, _))| id.as_str() == *name || secret_name == name)
                {
                    Some((id, (secret_name, data))) => json_response(
                        StatusCode::OK,
                        json!({ "ID": id, "SecretData": data, "Spec": { "Name": secret_name } }),
                    ),
                    None => error_response(StatusCode::NOT_FOUND, "no such secret"),
                }
            }
            (Method::DELETE, ["secrets", name]) => {
                let mut state = self.state.lock().unwrap();
                let name = name.to_string();
                let before = state.secrets.len();
                state
                    .secrets
                    .retain(|id, (secret_name, _)| *id != name && *secret_name != name);
                if state.secrets.len() == before {
                    error_response(StatusCode::NOT_FOUND, "no such secret")
                } else {
                    empty_response(StatusCode::NO_CONTENT)
                }
            }

            _ => text_response(StatusCode::NOT_FOUND, "no such route"),
        }
    }

    async fn create_container(&self, request: Request<Incoming>) -> Response<RequestBody> {
        if content_type(&request) != "application/json" {
            return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected JSON");
        }
        let body: Value = match serde_json::from_slice(&read_body(request).await) {
            Ok(value) => value,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        let mut state = self.state.lock().unwrap();
        let id = state.new_id("cont");
        let name = body["name"].as_str().unwrap_or(id.as_str()).to_string();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name,
            image: body["image"].as_str().unwrap_or_default().to_string(),
            running: false,
        });
        json_response(StatusCode::CREATED, json!({ "Id": id, "Warnings": [] }))
    }

    fn inspect_container(&self, name_or_id: &str) -> Response<RequestBody> {
        let mut state = self.state.lock().unwrap();
        match state.container_mut(name_or_id) {
            Some(c) => json_response(
                StatusCode::OK,
                json!({
                    "Id": c.id,
                    "Name": c.name,
                    "Image": c.image,
                    "Config": { "User": "", "Cmd": ["sh"] },
                    "HostConfig": { "RestartPolicy": { "Name": "no" } },
                    "NetworkSettings": { "Networks": {} },
                    "State": { "Running": c.running },
                }),
            ),
            None => error_response(StatusCode::NOT_FOUND, "no such container"),
        }
    }

    async fn upload_archive(&self, name_or_id: &str, request: Request<Incoming>) -> Response<RequestBody> {
        if content_type(&request) != "application/x-tar" {
            return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected a tar archive");
        }
        if query_params(&request).get("path").map(String::as_str) != Some("/") {
            return error_response(StatusCode::BAD_REQUEST, "archive path must be /");
        }

        let id = {
            let mut state = self.state.lock().unwrap();
            match state.container_mut(name_or_id) {
                Some(c) => c.id.clone(),
                None => return error_response(StatusCode::NOT_FOUND, "no such container"),
            }
        };

        let bytes = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        self.state
            .lock()
            .unwrap()
            .archives
            .insert(id, bytes.to_vec());
        empty_response(StatusCode::OK)
    }

    fn pull(&self, request: Request<Incoming>) -> Response<RequestBody> {
        let params = query_params(&request);
        let Some(reference) = params.get("reference").cloned() else {
            return error_response(StatusCode::BAD_REQUEST, "reference is required");
        };

        let auth = request
            .headers()
            .get("x-registry-auth")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let image = self.state.lock().unwrap().images.get(&reference).cloned();
        let delay = *self.pull_delay.lock().unwrap();

        let mut lines: Vec<Value> = Vec::new();
        match image {
            None => lines.push(json!({
                "error": format!("Not present in valid references list: {}", reference)
            })),
            Some(image) => match (&image.credentials, auth) {
                (Some(_), None) => lines.push(json!({ "error": "Authentication required" })),
                (Some((user, pass)), Some(header)) if !credentials_match(&header, user, pass) => {
                    lines.push(json!({ "error": "Authentication failed" }))
                }
                _ => {
                    for n in 0..image.progress_lines {
                        lines.push(json!({ "stream": format!("{} progress {}\n", reference, n) }));
                    }
                    lines.push(json!({ "id": image.id, "images": [image.id] }));
                }
            },
        }

        let (tx, body) = ChannelBody::channel(1);
        tokio::spawn(async move {
            for line in lines {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let mut bytes = line.to_string().into_bytes();
                bytes.push(b'\n');
                if tx.send(Ok(Bytes::from(bytes))).await.is_err() {
                    return;
                }
            }
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body.boxed())
            .unwrap()
    }

    async fn create_network(&self, request: Request<Incoming>) -> Response<RequestBody> {
        if content_type(&request) != "application/json" {
            return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected JSON");
        }
        let mut network: Value = match serde_json::from_slice(&read_body(request).await) {
            Ok(value) => value,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        let mut state = self.state.lock().unwrap();
        let id = state.new_id("netw");
        network["id"] = json!(id);
        state.networks.insert(id, network.clone());
        json_response(StatusCode::OK, network)
    }

    async fn create_secret(&self, request: Request<Incoming>) -> Response<RequestBody> {
        if !content_type(&request).starts_with("text/plain") {
            return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected text");
        }
        let Some(name) = query_params(&request).remove("name") else {
            return error_response(StatusCode::BAD_REQUEST, "name is required");
        };
        let data = String::from_utf8_lossy(&read_body(request).await).into_owned();

        let mut state = self.state.lock().unwrap();
        let id = state.new_id("secr");
        state.secrets.insert(id.clone(), (name, data));
        json_response(StatusCode::OK, json!({ "ID": id }))
    }
}

fn credentials_match(header: &str, user: &str, pass: &str) -> bool {
    use base64::Engine;
    let Ok(decoded) = base64::engine::general_purpose::URL_SAFE.decode(header) else {
        return false;
    };
    let Ok(auth) = serde_json::from_slice::<Value>(&decoded) else {
        return false;
    };
    auth["Username"] == user && auth["Password"] == pass
}
