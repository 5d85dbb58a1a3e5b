use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::{Entity, IdmError, Page};

/// Error body returned by the management API on non-2xx responses.
#[allow(dead_code)]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl ApiErrorBody {
    /// Lenient parse; anything that is not a JSON object yields an empty body.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

/// Decodes a successful response body. Empty bodies (e.g. 204) decode to null.
pub fn decode_entity(body: &str) -> Result<Entity, IdmError> {
    if body.trim().is_empty() {
        return Ok(Entity::Null);
    }
    serde_json::from_str(body)
        .map_err(|err| IdmError::Decode(format!("invalid response JSON: {err}; body: {body}")))
}

/// Decodes a list response into a [`Page`].
///
/// A bare array is the whole item list. An envelope object carries its
/// items under `items_key` alongside optional `next`, `total`, `start` and
/// `limit`. Without a configured key the envelope must hold exactly one
/// array-valued field; object keys carry no order to pick from.
pub fn decode_page(body: Entity, items_key: Option<&str>) -> Result<Page<Entity>, IdmError> {
    match body {
        JsonValue::Array(items) => Ok(Page {
            items,
            ..Page::default()
        }),
        JsonValue::Object(mut envelope) => {
            let items = take_items(&mut envelope, items_key)?;
            Ok(Page {
                items,
                next_cursor: envelope
                    .get("next")
                    .and_then(JsonValue::as_str)
                    .filter(|cursor| !cursor.is_empty())
                    .map(str::to_owned),
                total: envelope.get("total").and_then(JsonValue::as_u64),
                start: envelope.get("start").and_then(JsonValue::as_u64),
                limit: envelope.get("limit").and_then(JsonValue::as_u64),
            })
        }
        JsonValue::Null => Ok(Page::default()),
        other => Err(IdmError::Decode(format!(
            "expected list response, got {other}"
        ))),
    }
}

fn take_items(
    envelope: &mut Map<String, JsonValue>,
    items_key: Option<&str>,
) -> Result<Vec<Entity>, IdmError> {
    let key = match items_key {
        Some(key) => key.to_owned(),
        None => {
            let mut arrays = envelope
                .iter()
                .filter(|(_, value)| value.is_array())
                .map(|(key, _)| key);
            match (arrays.next(), arrays.next()) {
                (Some(key), None) => key.clone(),
                (None, _) => {
                    return Err(IdmError::Decode(
                        "list envelope has no array field".to_owned(),
                    ))
                }
                (Some(first), Some(second)) => {
                    return Err(IdmError::Decode(format!(
                        "list envelope has several array fields ('{first}', '{second}'); configure an items key"
                    )))
                }
            }
        }
    };

    match envelope.remove(&key) {
        Some(JsonValue::Array(items)) => Ok(items),
        Some(other) => Err(IdmError::Decode(format!(
            "expected array under '{key}', got {other}"
        ))),
        None => Err(IdmError::Decode(format!(
            "list envelope is missing '{key}'"
        ))),
    }
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header.
pub fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param.eq_ignore_ascii_case("rel=\"next\"") || param.eq_ignore_ascii_case("rel=next")
        });
        if !is_next {
            return None;
        }
        target.strip_prefix('<')?.strip_suffix('>')
    })
}
