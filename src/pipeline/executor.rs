//! Building and sending one HTTP request from a resolved test definition

use std::str::FromStr;
use std::time::{Duration, Instant};

use cookie::Cookie;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Proxy};
use serde_json::Value as JsonValue;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::errors::{PipelineError, Result};
use super::resolver::{FileUpload, Resolved};
use super::response::ResponseSnapshot;

/// Lower-case the base and give it a scheme when it has none
pub fn normalize_base(base: &str) -> String {
    let base = base.trim().to_lowercase();
    if base.contains("://") {
        base
    } else {
        format!("http://{}", base)
    }
}

/// Join `uri` onto the normalized base. An absolute `uri` still works when
/// the base is missing or unusable.
pub fn build_url(base: &str, uri: Option<&str>) -> Result<Url> {
    let base_url = match Url::parse(&normalize_base(base)) {
        Ok(url) => url,
        Err(e) => {
            return match uri.map(Url::parse) {
                Some(Ok(url)) => Ok(url),
                _ => Err(PipelineError::document(format!("invalid base URL '{}': {}", base, e))),
            }
        }
    };
    match uri {
        None | Some("") => Ok(base_url),
        Some(uri) => base_url
            .join(uri)
            .map_err(|e| PipelineError::document(format!("cannot join '{}' onto '{}': {}", uri, base_url, e))),
    }
}

#[derive(Debug)]
pub enum RequestBody {
    Empty,
    Raw(String),
    Form(Vec<(String, String)>),
    Json(JsonValue),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<(String, FilePart)>,
    },
}

#[derive(Debug)]
pub enum FilePart {
    Handle(FileUpload),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScope {
    Http,
    Https,
    All,
}

/// Everything needed to send one request; built before any I/O happens so
/// document mistakes surface as errors rather than transport failures
#[derive(Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub cookies: Vec<Cookie<'static>>,
    pub auth: Option<(String, Option<String>)>,
    pub proxies: Vec<(ProxyScope, String)>,
    pub timeout: Duration,
}

impl PreparedRequest {
    /// Build from resolved `request` parameters
    pub fn prepare(mut params: Resolved, base: &str, default_timeout: Duration) -> Result<Self> {
        if !(params.is_null() || matches!(params, Resolved::Map(_))) {
            return Err(PipelineError::document("request must be a mapping"));
        }

        let method = match params.get("method").and_then(Resolved::as_json) {
            None | Some(JsonValue::Null) => Method::GET,
            Some(JsonValue::String(m)) if m.is_empty() => Method::GET,
            Some(JsonValue::String(m)) => Method::from_str(&m.to_uppercase())
                .map_err(|_| PipelineError::document(format!("invalid HTTP method '{}'", m)))?,
            Some(other) => return Err(PipelineError::document(format!("invalid HTTP method {}", other))),
        };

        let uri = params.get("uri").map(Resolved::to_json);
        let uri = match &uri {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        let mut url = build_url(base, uri.as_deref())?;

        if let Some(query) = params.get("query") {
            apply_query(&mut url, &query.to_json())?;
        }

        let headers = match params.get("headers") {
            Some(h) => parse_headers(&h.to_json())?,
            None => HeaderMap::new(),
        };

        let files = params.take("files");
        let body = params.take("body");
        let json = params.get("json").map(Resolved::to_json).filter(|j| !j.is_null());
        let body = build_body(body, files, json)?;

        let cookies = match params.get("cookies") {
            Some(c) => parse_cookies(&c.to_json())?,
            None => Vec::new(),
        };
        let auth = match params.get("auth") {
            Some(a) => parse_auth(&a.to_json())?,
            None => None,
        };
        let proxies = match params.get("proxies") {
            Some(p) => parse_proxies(&p.to_json())?,
            None => Vec::new(),
        };
        let timeout = match params.get("timeout") {
            Some(t) => parse_timeout(&t.to_json(), default_timeout)?,
            None => default_timeout,
        };

        Ok(Self {
            method,
            url,
            headers,
            body,
            cookies,
            auth,
            proxies,
            timeout,
        })
    }

    /// `Cookie` header value for the document-supplied cookies matching this URL
    pub fn cookie_header(&self) -> Option<String> {
        let host = self.url.host_str()?.to_lowercase();
        let path = self.url.path();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| domain_matches(&host, c.domain().unwrap_or_default()))
            .filter(|c| path.starts_with(c.path().unwrap_or("/")))
            .map(|c| c.stripped().to_string())
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Proxies need their own client; everything else rides the shared session
    fn needs_dedicated_client(&self) -> bool {
        !self.proxies.is_empty()
    }

    fn build_client(&self) -> std::result::Result<Client, reqwest::Error> {
        let mut builder = Client::builder().cookie_store(true);
        for (scope, target) in &self.proxies {
            let proxy = match scope {
                ProxyScope::Http => Proxy::http(target)?,
                ProxyScope::Https => Proxy::https(target)?,
                ProxyScope::All => Proxy::all(target)?,
            };
            builder = builder.proxy(proxy);
        }
        builder.build()
    }

    /// Send and capture the response
    pub async fn send(self, shared: &Client) -> std::result::Result<ResponseSnapshot, reqwest::Error> {
        let client = if self.needs_dedicated_client() {
            self.build_client()?
        } else {
            shared.clone()
        };

        let cookie_header = self.cookie_header();
        let requested_url = self.url.to_string();

        let mut request = client
            .request(self.method, self.url)
            .headers(self.headers)
            .timeout(self.timeout);

        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }
        if let Some((user, pass)) = self.auth {
            request = request.basic_auth(user, pass);
        }

        request = match self.body {
            RequestBody::Empty => request,
            RequestBody::Raw(text) => request.body(text),
            RequestBody::Form(fields) => request.form(&fields),
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for (name, part) in files {
                    form = form.part(name.clone(), file_part(&name, part)?);
                }
                request.multipart(form)
            }
        };

        let start = Instant::now();
        let response = request.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers: IndexMap<String, String> = IndexMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let cookies: IndexMap<String, String> = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        let content = response.bytes().await?.to_vec();
        let elapsed = start.elapsed();

        let mut snapshot = ResponseSnapshot::new(status, headers, content);
        snapshot.cookies = cookies;
        snapshot.elapsed = elapsed;
        if final_url != requested_url {
            snapshot.history = vec![requested_url];
        }
        snapshot.url = final_url;
        Ok(snapshot)
    }
}

/// Human-readable transport failure
pub fn describe_transport_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("Request timed out after {:?}", timeout)
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else if err.is_request() {
        format!("Request error: {}", err)
    } else {
        err.to_string()
    }
}

fn file_part(name: &str, part: FilePart) -> std::result::Result<Part, reqwest::Error> {
    match part {
        FilePart::Handle(upload) => {
            let file_name = upload.file_name();
            let mime = mime_guess::from_path(&upload.path).first_or_octet_stream();
            let stream = ReaderStream::new(tokio::fs::File::from_std(upload.file));
            Part::stream(reqwest::Body::wrap_stream(stream))
                .file_name(file_name)
                .mime_str(mime.essence_str())
        }
        FilePart::Text(text) => Ok(Part::text(text).file_name(name.to_string())),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.').to_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Text form of a scalar parameter
fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_query(url: &mut Url, query: &JsonValue) -> Result<()> {
    match query {
        JsonValue::Null => Ok(()),
        JsonValue::String(raw) => {
            let raw = raw.trim_start_matches('?');
            if !raw.is_empty() {
                let merged = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, raw),
                    _ => raw.to_string(),
                };
                url.set_query(Some(&merged));
            }
            Ok(())
        }
        JsonValue::Object(map) if map.is_empty() => Ok(()),
        JsonValue::Object(map) => {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in map {
                match value {
                    JsonValue::Null => {}
                    JsonValue::Array(items) => {
                        for item in items {
                            pairs.append_pair(key, &scalar_text(item));
                        }
                    }
                    other => {
                        pairs.append_pair(key, &scalar_text(other));
                    }
                }
            }
            Ok(())
        }
        _ => Err(PipelineError::document("query must be a mapping or a string")),
    }
}

fn parse_headers(value: &JsonValue) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let map = match value {
        JsonValue::Null => return Ok(headers),
        JsonValue::Object(map) => map,
        _ => return Err(PipelineError::document("headers must be a mapping")),
    };
    for (name, value) in map {
        if value.is_null() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PipelineError::document(format!("invalid header name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(&scalar_text(value))
            .map_err(|e| PipelineError::document(format!("invalid value for header '{}': {}", name, e)))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

fn build_body(body: Option<Resolved>, files: Option<Resolved>, json: Option<JsonValue>) -> Result<RequestBody> {
    if body.as_ref().is_some_and(Resolved::contains_files) {
        return Err(PipelineError::document("read: file handles can only be sent under files"));
    }

    let files = match files {
        None => Vec::new(),
        Some(Resolved::Json(JsonValue::Null)) => Vec::new(),
        Some(Resolved::Map(map)) => map
            .into_iter()
            .map(|(name, value)| {
                let part = match value {
                    Resolved::File(upload) => FilePart::Handle(upload),
                    Resolved::Json(v) => FilePart::Text(scalar_text(&v)),
                    other => FilePart::Text(other.to_json().to_string()),
                };
                (name, part)
            })
            .collect(),
        Some(_) => return Err(PipelineError::document("files must be a mapping of field name to file")),
    };

    let fields: Option<Vec<(String, String)>> = match &body {
        Some(Resolved::Map(map)) => Some(
            map.iter()
                .map(|(k, v)| (k.clone(), scalar_text(&v.to_json())))
                .collect(),
        ),
        _ => None,
    };

    if !files.is_empty() {
        return match body {
            None | Some(Resolved::Json(JsonValue::Null)) | Some(Resolved::Map(_)) => Ok(RequestBody::Multipart {
                fields: fields.unwrap_or_default(),
                files,
            }),
            Some(_) => Err(PipelineError::document("body must be a mapping when files are sent")),
        };
    }

    match body {
        None | Some(Resolved::Json(JsonValue::Null)) => Ok(match json {
            Some(value) => RequestBody::Json(value),
            None => RequestBody::Empty,
        }),
        Some(Resolved::Map(_)) => Ok(RequestBody::Form(fields.unwrap_or_default())),
        Some(Resolved::Json(JsonValue::String(text))) => Ok(RequestBody::Raw(text)),
        Some(_) => Err(PipelineError::document("body must be a mapping or a string")),
    }
}

fn parse_cookies(value: &JsonValue) -> Result<Vec<Cookie<'static>>> {
    let items = match value {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Array(items) => items,
        _ => return Err(PipelineError::document("cookies must be a list of {name, value, domain}")),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = |key: &str| -> Result<String> {
                item.get(key)
                    .filter(|v| !v.is_null())
                    .map(scalar_text)
                    .ok_or_else(|| PipelineError::document(format!("cookie {} is missing '{}'", i + 1, key)))
            };
            let name = field("name")?;
            let value = field("value")?;
            let domain = field("domain")?;
            let path = item
                .get("path")
                .and_then(|p| p.as_str())
                .unwrap_or("/")
                .to_string();
            Ok(Cookie::build((name, value)).domain(domain).path(path).build())
        })
        .collect()
}

fn parse_auth(value: &JsonValue) -> Result<Option<(String, Option<String>)>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Array(items) if items.len() == 2 => {
            Ok(Some((scalar_text(&items[0]), Some(scalar_text(&items[1])))))
        }
        JsonValue::Array(items) if items.len() == 1 => Ok(Some((scalar_text(&items[0]), None))),
        _ => Err(PipelineError::document("auth must be a [user, password] pair")),
    }
}

fn parse_proxies(value: &JsonValue) -> Result<Vec<(ProxyScope, String)>> {
    let map = match value {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Object(map) => map,
        _ => return Err(PipelineError::document("proxies must be a mapping of scheme to proxy URL")),
    };
    map.iter()
        .filter(|(_, target)| !target.is_null())
        .map(|(scheme, target)| {
            let scope = match scheme.trim_end_matches("://").to_lowercase().as_str() {
                "http" => ProxyScope::Http,
                "https" => ProxyScope::Https,
                "all" => ProxyScope::All,
                other => {
                    return Err(PipelineError::document(format!(
                        "unsupported proxy scheme '{}' (expected http, https or all)",
                        other
                    )))
                }
            };
            let target = scalar_text(target);
            Url::parse(&target)
                .map_err(|e| PipelineError::document(format!("invalid proxy URL '{}': {}", target, e)))?;
            Ok((scope, target))
        })
        .collect()
}

fn parse_timeout(value: &JsonValue, default: Duration) -> Result<Duration> {
    let invalid = || PipelineError::document(format!("invalid timeout {}", value));
    let timeout = match value {
        JsonValue::Null => return Ok(default),
        JsonValue::Number(n) => {
            let secs = n.as_f64().ok_or_else(invalid)?;
            if secs < 0.0 || !secs.is_finite() {
                return Err(invalid());
            }
            Duration::from_secs_f64(secs)
        }
        JsonValue::String(s) => match s.trim().parse::<f64>() {
            Ok(secs) if secs >= 0.0 && secs.is_finite() => Duration::from_secs_f64(secs),
            Ok(_) => return Err(invalid()),
            Err(_) => humantime::parse_duration(s.trim()).map_err(|_| invalid())?,
        },
        _ => return Err(invalid()),
    };
    Ok(if timeout.is_zero() { default } else { timeout })
}
