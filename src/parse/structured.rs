//! Locating a JSON detection list in free-form model output.

use serde_json::{Map, Value};

use super::{BoxConvention, Candidate, Located, RawBox, RawConfidence};

const LABEL_KEYS: &[&str] = &[
    "label",
    "name",
    "class",
    "class_name",
    "category",
    "element",
    "object",
];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "score", "probability", "conf"];
const BOX_KEYS: &[&str] = &["box", "bbox", "bounding_box", "coordinates"];
const CONTAINER_KEYS: &[&str] = &[
    "detections",
    "objects",
    "results",
    "predictions",
    "elements",
    "items",
];

const XYXY_KEY_SETS: &[[&str; 4]] = &[
    ["x_min", "y_min", "x_max", "y_max"],
    ["xmin", "ymin", "xmax", "ymax"],
    ["x1", "y1", "x2", "y2"],
    ["left", "top", "right", "bottom"],
];
const XYWH_KEY_SETS: &[[&str; 4]] = &[["x", "y", "width", "height"], ["x", "y", "w", "h"]];

/// Tries, in order: the whole text, each fenced code block, the span from
/// the first `[` to the last `]`, and the span from the first `{` to the
/// last `}`. The first one that parses and holds a detection list wins.
pub(crate) fn locate(raw: &str) -> Located {
    for source in json_sources(raw) {
        let Ok(value) = serde_json::from_str::<Value>(source) else {
            continue;
        };
        if let Some(entries) = detection_list(&value) {
            return Located::List(entries.into_iter().map(candidate_from_value).collect());
        }
    }
    Located::Nothing
}

fn json_sources(raw: &str) -> Vec<&str> {
    let mut sources = vec![raw.trim()];
    sources.extend(fenced_blocks(raw));
    if let Some(span) = span_between(raw, '[', ']') {
        sources.push(span);
    }
    if let Some(span) = span_between(raw, '{', '}') {
        sources.push(span);
    }
    sources
}

/// Contents of every ```` ``` ```` fenced block, with the info string removed.
fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // The info string (e.g. `json`) runs to the end of the line.
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
        let body = &after_fence[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim());
        rest = &body[close + 3..];
    }
    blocks
}

fn span_between(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (start < end).then(|| &raw[start..=end])
}

/// Finds the list of candidate values inside a parsed JSON document.
fn detection_list(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() || items.iter().any(Value::is_object) {
                Some(items.iter().collect())
            } else {
                None
            }
        }
        Value::Object(map) => {
            for key in CONTAINER_KEYS {
                if let Some(list) = map.get(*key).filter(|v| v.is_array()) {
                    return detection_list(list);
                }
            }
            if looks_like_detection(map) {
                return Some(vec![value]);
            }
            map.values().find_map(|inner| match inner {
                Value::Array(items) if items.iter().any(Value::is_object) => {
                    Some(items.iter().collect())
                }
                _ => None,
            })
        }
        _ => None,
    }
}

fn looks_like_detection(map: &Map<String, Value>) -> bool {
    BOX_KEYS.iter().any(|k| map.contains_key(*k)) || inline_box(map).is_some()
}

fn candidate_from_value(value: &Value) -> Option<Candidate> {
    let map = value.as_object()?;

    let label = first_present(map, LABEL_KEYS).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    let confidence = match first_present(map, CONFIDENCE_KEYS) {
        Some(Value::Number(n)) => n
            .as_f64()
            .map_or_else(|| RawConfidence::Text(n.to_string()), RawConfidence::Number),
        Some(Value::String(s)) => RawConfidence::Text(s.clone()),
        Some(other) => RawConfidence::Text(other.to_string()),
        None => RawConfidence::Missing,
    };

    let convention = match map.get("format").and_then(Value::as_str) {
        Some(format) if format.eq_ignore_ascii_case("xywh") => BoxConvention::Xywh,
        _ => BoxConvention::Xyxy,
    };

    let bbox = match first_present(map, BOX_KEYS) {
        Some(Value::Array(values)) => four_numbers(values).map(|values| RawBox {
            values,
            convention,
        }),
        Some(Value::Object(inner)) => inline_box(inner),
        _ => inline_box(map),
    };

    Some(Candidate {
        label,
        confidence,
        bbox,
    })
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

/// Reads a box spelled out as named fields, e.g. `{"xmin": .., "ymin": ..}`.
fn inline_box(map: &Map<String, Value>) -> Option<RawBox> {
    let read = |keys: &[&str; 4]| -> Option<[f64; 4]> {
        let mut values = [0.0; 4];
        for (slot, key) in values.iter_mut().zip(keys) {
            *slot = number(map.get(*key)?)?;
        }
        Some(values)
    };

    XYXY_KEY_SETS
        .iter()
        .find_map(|keys| read(keys).map(RawBox::xyxy))
        .or_else(|| XYWH_KEY_SETS.iter().find_map(|keys| read(keys).map(RawBox::xywh)))
}

fn four_numbers(values: &[Value]) -> Option<[f64; 4]> {
    match values {
        [a, b, c, d] => Some([number(a)?, number(b)?, number(c)?, number(d)?]),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
