#![allow(dead_code)]

use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use serde_json::{json, Value};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Image sizes from tiny to large.
pub fn arb_image_dims() -> impl Strategy<Value = (u32, u32)> {
    (1u32..4000, 1u32..4000)
}

/// A coordinate that may be in pixels, normalized, negative or past the edge.
fn arb_coord() -> BoxedStrategy<Value> {
    prop_oneof![
        4 => (-500i64..5000).prop_map(Value::from),
        2 => (0.0f64..=1.0).prop_map(Value::from),
        1 => (-1e6f64..1e6).prop_map(Value::from),
        1 => (-500i64..5000).prop_map(|n| Value::from(n.to_string())),
    ]
    .boxed()
}

fn arb_confidence() -> BoxedStrategy<Value> {
    prop_oneof![
        4 => (0.0f64..=1.0).prop_map(Value::from),
        1 => (-2.0f64..3.0).prop_map(Value::from),
        1 => (0u32..=150).prop_map(|p| Value::from(format!("{p}%"))),
        1 => Just(Value::from("high")),
        1 => Just(Value::Null),
    ]
    .boxed()
}

fn arb_label() -> BoxedStrategy<Value> {
    prop_oneof![
        6 => "[a-z][a-z -]{0,15}".prop_map(Value::from),
        1 => Just(Value::from("")),
        1 => Just(Value::Null),
    ]
    .boxed()
}

/// One loosely shaped detection object like a model might produce.
pub fn arb_detection_value() -> BoxedStrategy<Value> {
    let box_array = prop::collection::vec(arb_coord(), 3..=5).prop_map(Value::Array);
    let box_object = (arb_coord(), arb_coord(), arb_coord(), arb_coord())
        .prop_map(|(x, y, w, h)| json!({"x": x, "y": y, "width": w, "height": h}));
    let bbox = prop_oneof![4 => box_array, 1 => box_object];

    (arb_label(), arb_confidence(), bbox).prop_map(|(label, confidence, bbox)| {
        json!({"label": label, "confidence": confidence, "box": bbox})
    })
    .boxed()
}

/// A full response text: a JSON list, optionally wrapped in prose or a fence.
pub fn arb_response() -> BoxedStrategy<String> {
    let list = prop::collection::vec(arb_detection_value(), 0..12)
        .prop_map(|items| Value::Array(items).to_string());
    (list, 0u8..3)
        .prop_map(|(json, wrapping)| match wrapping {
            0 => json,
            1 => format!("Here is what I see:\n```json\n{json}\n```\nHope that helps!"),
            _ => format!("Detections: {json} -- end of list"),
        })
        .boxed()
}
