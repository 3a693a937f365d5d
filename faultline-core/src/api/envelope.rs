//! Response schema of the service under test.
//!
//! Every JSON endpoint answers `{code, message, data}`; `code == 0` is success. Field
//! spellings vary between endpoints, so each accepted spelling is listed explicitly and
//! tried in order.

use faultline_http::HttpResponse;
use serde::Deserialize;
use serde_json::Value;

use crate::error::StepError;

/// Resource id spellings, in lookup order.
pub const ID_KEYS: [&str; 2] = ["songId", "song_id"];
/// Download locator spellings, in lookup order.
pub const LOCATOR_KEYS: [&str; 2] = ["audioUrl", "audio_url"];
/// User id spellings, in lookup order.
pub const USER_ID_KEYS: [&str; 2] = ["userId", "user_id"];

const BODY_SNIPPET_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Check status, decode the envelope and return its `data`.
pub fn decode(res: &HttpResponse) -> Result<Value, StepError> {
    if !res.is_success() {
        return Err(StepError::Http {
            status: res.status,
            body: res.body_snippet(BODY_SNIPPET_CHARS),
        });
    }

    let env: Envelope = serde_json::from_slice(&res.body)
        .map_err(|e| StepError::protocol(res.status, format!("undecodable envelope: {e}")))?;

    if env.code != 0 {
        return Err(StepError::Business {
            status: res.status,
            code: env.code,
            message: env.message.unwrap_or_default(),
        });
    }
    Ok(env.data)
}

/// Auth token: `data` is either the bare token or `{ "token": ... }`.
pub fn token(data: &Value) -> Option<String> {
    let raw = match data {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("token")?.as_str()?,
        _ => return None,
    };
    (!raw.is_empty()).then(|| raw.to_string())
}

/// A list is either a bare array or a page object `{ "items": [...] }`.
pub fn items(data: &Value) -> Option<&[Value]> {
    match data {
        Value::Array(items) => Some(items.as_slice()),
        Value::Object(map) => map.get("items")?.as_array().map(Vec::as_slice),
        _ => None,
    }
}

/// Integer id under the first present key; numeric strings are accepted.
pub fn id_field(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Non-empty string under the first key that has one.
pub fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// `data` of a create call: the new id, bare or wrapped in an object.
pub fn created_id(data: &Value) -> Option<i64> {
    match data {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(_) => id_field(data, &ID_KEYS).or_else(|| id_field(data, &["id"])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn res(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::from(body.to_string()),
            headers: Vec::new(),
        }
    }

    #[test]
    fn decode_classifies_failures() {
        match decode(&res(502, "bad gateway")) {
            Err(StepError::Http { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            decode(&res(200, "<html>")),
            Err(StepError::Protocol { status: 200, .. })
        ));

        match decode(&res(200, r#"{"code":1,"message":"db down","data":null}"#)) {
            Err(StepError::Business { code, message, .. }) => {
                assert_eq!(code, 1);
                assert_eq!(message, "db down");
            }
            other => panic!("unexpected: {other:?}"),
        }

        match decode(&res(200, r#"{"code":0,"data":{"a":1}}"#)) {
            Ok(data) => assert_eq!(data, json!({"a": 1})),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn http_body_is_truncated() {
        let long = "x".repeat(500);
        match decode(&res(500, &long)) {
            Err(StepError::Http { body, .. }) => assert_eq!(body.len(), BODY_SNIPPET_CHARS),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn token_accepts_both_shapes() {
        assert_eq!(token(&json!("abc")), Some("abc".to_string()));
        assert_eq!(token(&json!({"token": "abc"})), Some("abc".to_string()));
        assert_eq!(token(&json!({"jwt": "abc"})), None);
        assert_eq!(token(&json!("")), None);
        assert_eq!(token(&Value::Null), None);
    }

    #[test]
    fn items_accepts_array_or_page() {
        let arr = json!([{"songId": 1}]);
        let page = json!({"items": [{"songId": 1}, {"song_id": 2}], "total": 2});
        assert_eq!(items(&arr).map(<[Value]>::len), Some(1));
        assert_eq!(items(&page).map(<[Value]>::len), Some(2));
        assert_eq!(items(&json!({"total": 0})), None);
    }

    #[test]
    fn fields_follow_documented_fallback_order() {
        let a = json!({"songId": 7, "audioUrl": "songs/a.mp3"});
        let b = json!({"song_id": "8", "audio_url": "songs/b.mp3"});
        let both = json!({"songId": 1, "song_id": 2, "audioUrl": "", "audio_url": "x.mp3"});
        let none = json!({"name": "c"});

        assert_eq!(id_field(&a, &ID_KEYS), Some(7));
        assert_eq!(id_field(&b, &ID_KEYS), Some(8));
        assert_eq!(id_field(&both, &ID_KEYS), Some(1));
        assert_eq!(id_field(&none, &ID_KEYS), None);

        assert_eq!(str_field(&a, &LOCATOR_KEYS), Some("songs/a.mp3".to_string()));
        assert_eq!(str_field(&b, &LOCATOR_KEYS), Some("songs/b.mp3".to_string()));
        // An empty first spelling falls through to the second.
        assert_eq!(str_field(&both, &LOCATOR_KEYS), Some("x.mp3".to_string()));
        assert_eq!(str_field(&none, &LOCATOR_KEYS), None);
    }

    #[test]
    fn created_id_shapes() {
        assert_eq!(created_id(&json!(42)), Some(42));
        assert_eq!(created_id(&json!("42")), Some(42));
        assert_eq!(created_id(&json!({"songId": 42})), Some(42));
        assert_eq!(created_id(&json!({"id": 42})), Some(42));
        assert_eq!(created_id(&json!(null)), None);
    }
}
