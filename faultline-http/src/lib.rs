#![forbid(unsafe_code)]

mod body;
mod client;
mod error;
mod multipart;
mod types;
mod util;

pub use body::RequestBody;
pub use client::HttpClient;
pub use error::{Error, Result};
pub use multipart::Multipart;
pub use types::{HttpRequest, HttpResponse};
