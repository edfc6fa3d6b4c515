//! Thin helpers around reqwest that turn every non 2xx answer from hive into an
//! error carrying the status and the body text.

use std::collections::BTreeMap;
use std::path::PathBuf;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use tracing::trace;

use crate::error::{Error, Result};

pub(crate) fn check_status(status: StatusCode, body: String) -> Result<String> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Protocol { status, body })
    }
}

async fn read_body(resp: Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    check_status(status, body)
}

pub(crate) async fn post_form(http: &Client, url: &str, fields: &[(&str, &str)]) -> Result<String> {
    trace!(url, "POST form");
    read_body(http.post(url).form(fields).send().await?).await
}

/// Posts `params` as text fields and the content of each file in `files` as a
/// file part named by its key. Keys go out verbatim, hive expects init file
/// names like `/genesis.json` in a plain `name=` parameter.
pub(crate) async fn post_multipart(
    http: &Client,
    url: &str,
    params: &BTreeMap<String, String>,
    files: &BTreeMap<String, PathBuf>,
) -> Result<String> {
    let mut form = Form::new().percent_encode_noop();
    for (key, value) in params {
        form = form.text(key.clone(), value.clone());
    }
    for (key, path) in files {
        // the file is closed once read, before the request goes out
        let content = tokio::fs::read(path).await.map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        form = form.part(key.clone(), Part::bytes(content).file_name(file_name));
    }

    trace!(url, params = params.len(), files = files.len(), "POST multipart");
    read_body(http.post(url).multipart(form).send().await?).await
}

pub(crate) async fn delete(http: &Client, url: &str) -> Result<String> {
    trace!(url, "DELETE");
    read_body(http.delete(url).send().await?).await
}

pub(crate) async fn get_text(http: &Client, url: &str) -> Result<String> {
    trace!(url, "GET");
    read_body(http.get(url).send().await?).await
}
