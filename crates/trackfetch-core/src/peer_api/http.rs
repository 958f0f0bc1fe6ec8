//! Blocking JSON-over-HTTP calls via libcurl.
//!
//! Runs in the current thread; the client calls it from `spawn_blocking`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpResponse {
    pub code: u32,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

pub(crate) fn request(
    method: Method,
    url: &str,
    api_key: Option<&str>,
    body: Option<&[u8]>,
    timeout: Duration,
) -> Result<HttpResponse, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.connect_timeout(Duration::from_secs(10))?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Accept: application/json")?;
    if body.is_some() {
        list.append("Content-Type: application/json")?;
    }
    if let Some(key) = api_key {
        list.append(&format!("X-API-Key: {}", key.trim()))?;
    }
    easy.http_headers(list)?;

    match method {
        Method::Get => easy.get(true)?,
        Method::Post => easy.post_fields_copy(body.unwrap_or_default())?,
        Method::Delete => easy.custom_request("DELETE")?,
    }

    let mut out = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            out.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    Ok(HttpResponse { code, body: out })
}
