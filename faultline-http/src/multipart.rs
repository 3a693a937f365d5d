use bytes::{BufMut as _, Bytes, BytesMut};

use crate::{HttpRequest, RequestBody};

/// `multipart/form-data` body builder.
#[derive(Debug, Clone)]
pub struct Multipart {
    boundary: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    file: Option<FileMeta>,
    data: Bytes,
}

#[derive(Debug, Clone)]
struct FileMeta {
    filename: String,
    content_type: String,
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl Multipart {
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(format!("faultline-{}", uuid::Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            file: None,
            data: Bytes::from(value.into()),
        });
        self
    }

    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            file: Some(FileMeta {
                filename: filename.into(),
                content_type: content_type.into(),
            }),
            data,
        });
        self
    }

    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the form. Part data is shared with the returned body, not copied; only the
    /// boundary and header framing are freshly allocated.
    #[must_use]
    pub fn encode(&self) -> RequestBody {
        let mut body = RequestBody::empty();
        let mut head = BytesMut::with_capacity(256);

        for part in &self.parts {
            head.put_slice(b"--");
            head.put_slice(self.boundary.as_bytes());
            head.put_slice(b"\r\n");

            head.put_slice(b"Content-Disposition: form-data; name=\"");
            head.put_slice(escape_quoted(&part.name).as_bytes());
            head.put_slice(b"\"");
            if let Some(file) = &part.file {
                head.put_slice(b"; filename=\"");
                head.put_slice(escape_quoted(&file.filename).as_bytes());
                head.put_slice(b"\"\r\nContent-Type: ");
                head.put_slice(file.content_type.as_bytes());
            }
            head.put_slice(b"\r\n\r\n");

            body.push(head.split().freeze());
            body.push(part.data.clone());
            head.put_slice(b"\r\n");
        }

        head.put_slice(b"--");
        head.put_slice(self.boundary.as_bytes());
        head.put_slice(b"--\r\n");
        body.push(head.freeze());
        body
    }

    /// Build a POST request carrying this form as its body.
    #[must_use]
    pub fn into_request(self, url: impl Into<String>) -> HttpRequest {
        let content_type = self.content_type();
        HttpRequest::post(url, self.encode()).header("content-type", content_type)
    }
}

fn escape_quoted(s: &str) -> String {
    s.replace('"', "%22").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts() {
        let form = Multipart::with_boundary("XyZ")
            .text("songName", "demo")
            .file("audioFile", "a.mp3", "audio/mpeg", Bytes::from_static(b"\x00\x01"));

        let body = form.encode().to_bytes();
        let expected: &[u8] = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"songName\"\r\n\r\n\
demo\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"audioFile\"; filename=\"a.mp3\"\r\n\
Content-Type: audio/mpeg\r\n\r\n\
\x00\x01\r\n\
--XyZ--\r\n";
        assert_eq!(body.as_ref(), expected);
        assert_eq!(form.content_type(), "multipart/form-data; boundary=XyZ");
    }

    #[test]
    fn quotes_in_names_cannot_break_the_header() {
        let body = Multipart::with_boundary("b")
            .file("f", "evil\"name.mp3", "audio/mpeg", Bytes::new())
            .encode()
            .to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("filename=\"evil%22name.mp3\""));
    }

    #[test]
    fn into_request_sets_content_type_header() {
        let req = Multipart::with_boundary("b")
            .text("k", "v")
            .into_request("http://localhost/upload");
        assert_eq!(req.method, http::Method::POST);
        assert!(
            req.headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "multipart/form-data; boundary=b")
        );
        assert!(!req.body.is_empty());
    }

    #[test]
    fn file_data_is_shared_not_copied() {
        let data = Bytes::from(vec![0xAB; 64 * 1024]);
        let body = Multipart::with_boundary("b")
            .text("songName", "demo")
            .file("audioFile", "a.mp3", "audio/mpeg", data.clone())
            .encode();

        let shared = body
            .chunks()
            .filter(|c| c.as_ptr() == data.as_ptr() && c.len() == data.len())
            .count();
        assert_eq!(shared, 1);
        assert_eq!(body.len(), body.to_bytes().len());
        assert!(body.len() > data.len());
    }

    #[test]
    fn generated_boundaries_are_unique() {
        assert_ne!(Multipart::new().boundary(), Multipart::new().boundary());
    }
}
