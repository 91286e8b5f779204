// Drive API client: the four file operations the CLI exposes, each a single
// REST call over an already authenticated transport.

use crate::error::{Error, Result, TransportError};
use crate::http::{Body, Request, Transport};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// File resource as returned by the API (default field set).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Serialize)]
struct Metadata<'a> {
    name: &'a str,
}

pub struct DriveClient<T> {
    transport: T,
    base_url: Url,
}

impl<T: Transport> DriveClient<T> {
    /// `base_url` is the API root, e.g. `https://www.googleapis.com`.
    pub fn new(transport: T, base_url: Url) -> Self {
        DriveClient {
            transport,
            base_url,
        }
    }

    /// Download the content of `id` into `dest`, returning the bytes written.
    /// `dest` is only created once the remote call has succeeded; a failure
    /// while copying leaves a partial file behind.
    pub fn download(&self, id: &str, dest: &Path) -> Result<u64> {
        let mut url = self.endpoint(&["drive", "v3", "files", id]);
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.transport.send(Request::get(url))?.error_for_status()?;
        let mut body = response.into_reader();

        let mut out = File::create(dest).map_err(|e| Error::local_io(dest, e))?;
        let written = io::copy(&mut body, &mut out).map_err(|e| Error::local_io(dest, e))?;
        debug!(id, bytes = written, path = %dest.display(), "downloaded file");
        Ok(written)
    }

    /// Replace the content of `id` with `source`, renaming it to the local
    /// file name.
    pub fn update(&self, id: &str, source: &Path) -> Result<DriveFile> {
        let mut url = self.endpoint(&["upload", "drive", "v3", "files", id]);
        url.query_pairs_mut().append_pair("uploadType", "multipart");
        self.upload(Method::PATCH, url, source)
    }

    /// Create a new file from `source`, named after the local file.
    pub fn create(&self, source: &Path) -> Result<DriveFile> {
        let mut url = self.endpoint(&["upload", "drive", "v3", "files"]);
        url.query_pairs_mut().append_pair("uploadType", "multipart");
        self.upload(Method::POST, url, source)
    }

    /// First page of files visible to the operator.
    pub fn list(&self) -> Result<Vec<DriveFile>> {
        let url = self.endpoint(&["drive", "v3", "files"]);
        let list: FileList = self
            .transport
            .send(Request::get(url))?
            .error_for_status()?
            .json()?;
        Ok(list.files)
    }

    fn upload(&self, method: Method, url: Url, source: &Path) -> Result<DriveFile> {
        let file = File::open(source).map_err(|e| Error::local_io(source, e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::local_io(source, e))?
            .len();
        let name = base_name(source);

        let body = multipart_related(&Metadata { name: &name }, file, len)?;
        let created: DriveFile = self
            .transport
            .send(Request::new(method, url).with_body(body))?
            .error_for_status()?
            .json()?;
        debug!(id = %created.id, name = %created.name, "uploaded file");
        Ok(created)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// `multipart/related` body: JSON metadata first, then the media streamed
/// from `media`.
fn multipart_related(
    metadata: &impl Serialize,
    media: impl Read + Send + 'static,
    media_len: u64,
) -> Result<Body, TransportError> {
    let boundary = format!("gdrive-{}", Uuid::new_v4().simple());
    let json = serde_json::to_string(metadata).map_err(TransportError::Decode)?;

    let head = format!(
        "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{json}\r\n\
         --{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    let tail = format!("\r\n--{boundary}--\r\n").into_bytes();
    let len = head.len() as u64 + media_len + tail.len() as u64;

    Ok(Body::Stream {
        content_type: format!("multipart/related; boundary={boundary}"),
        reader: Box::new(Cursor::new(head).chain(media).chain(Cursor::new(tail))),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeTransport;
    use reqwest::StatusCode;
    use std::fs;

    fn client(fake: &FakeTransport) -> DriveClient<&FakeTransport> {
        DriveClient::new(fake, Url::parse("https://www.googleapis.com").unwrap())
    }

    #[test]
    fn download_writes_body_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let fake = FakeTransport::new().reply(StatusCode::OK, "file contents");

        let written = client(&fake).download("abc123", &dest).unwrap();

        assert_eq!(written, 13);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "file contents");
        let sent = &fake.requests()[0];
        assert_eq!(sent.method, Method::GET);
        assert_eq!(
            sent.url.as_str(),
            "https://www.googleapis.com/drive/v3/files/abc123?alt=media"
        );
    }

    #[test]
    fn failed_download_leaves_no_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let fake = FakeTransport::new().reply(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":404,"message":"File not found: nope."}}"#,
        );

        let err = client(&fake).download("nope", &dest).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Status { status, .. }) if status == StatusCode::NOT_FOUND
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn download_into_missing_directory_is_local_io() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("out.bin");
        let fake = FakeTransport::new().reply(StatusCode::OK, "x");

        let err = client(&fake).download("abc", &dest).unwrap_err();
        assert!(matches!(err, Error::LocalIo { .. }));
    }

    #[test]
    fn identifiers_are_escaped_as_one_segment() {
        let fake = FakeTransport::new().reply(StatusCode::OK, "");
        let dir = tempfile::tempdir().unwrap();
        client(&fake).download("a/b c", &dir.path().join("x")).unwrap();
        assert_eq!(
            fake.requests()[0].url.path(),
            "/drive/v3/files/a%2Fb%20c"
        );
    }

    #[test]
    fn create_sends_metadata_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.csv");
        fs::write(&source, "a,b\n1,2\n").unwrap();
        let fake = FakeTransport::new().reply(
            StatusCode::OK,
            r#"{"kind":"drive#file","id":"1XyZ","name":"report.csv","mimeType":"text/csv"}"#,
        );

        let created = client(&fake).create(&source).unwrap();
        assert_eq!(
            created,
            DriveFile {
                id: "1XyZ".into(),
                name: "report.csv".into(),
                mime_type: "text/csv".into(),
            }
        );

        let sent = &fake.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(
            sent.url.as_str(),
            "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart"
        );
        let content_type = sent.content_type.clone().unwrap();
        let boundary = content_type
            .strip_prefix("multipart/related; boundary=")
            .unwrap();
        let body = String::from_utf8(sent.body.clone()).unwrap();
        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains(r#"{"name":"report.csv"}"#));
        assert!(body.contains("\r\n\r\na,b\n1,2\n\r\n"));
        assert!(body.ends_with(&format!("\r\n--{boundary}--\r\n")));
    }

    #[test]
    fn update_patches_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        fs::write(&source, "v2").unwrap();
        let fake = FakeTransport::new().reply(
            StatusCode::OK,
            r#"{"id":"1XyZ","name":"notes.txt","mimeType":"text/plain"}"#,
        );

        let updated = client(&fake).update("1XyZ", &source).unwrap();
        assert_eq!(updated.name, "notes.txt");

        let sent = &fake.requests()[0];
        assert_eq!(sent.method, Method::PATCH);
        assert_eq!(
            sent.url.as_str(),
            "https://www.googleapis.com/upload/drive/v3/files/1XyZ?uploadType=multipart"
        );
    }

    #[test]
    fn upload_of_missing_file_makes_no_request() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeTransport::new();
        let err = client(&fake).create(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, Error::LocalIo { .. }));
        assert!(fake.requests().is_empty());
    }

    #[test]
    fn list_returns_files() {
        let fake = FakeTransport::new().reply(
            StatusCode::OK,
            r#"{"kind":"drive#fileList","incompleteSearch":false,"files":[
                {"kind":"drive#file","id":"1","name":"a.txt","mimeType":"text/plain"},
                {"kind":"drive#file","id":"2","name":"b.pdf","mimeType":"application/pdf"}
            ]}"#,
        );
        let files = client(&fake).list().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].name, "b.pdf");
        assert_eq!(
            fake.requests()[0].url.as_str(),
            "https://www.googleapis.com/drive/v3/files"
        );
    }

    #[test]
    fn base_url_with_path_prefix_is_kept() {
        let fake = FakeTransport::new().reply(StatusCode::OK, r#"{"files":[]}"#);
        let client = DriveClient::new(&fake, Url::parse("http://127.0.0.1:8080/mock/").unwrap());
        client.list().unwrap();
        assert_eq!(
            fake.requests()[0].url.as_str(),
            "http://127.0.0.1:8080/mock/drive/v3/files"
        );
    }
}
