//! Line-oriented fallback for answers that never contained JSON.
//!
//! Recognizes lines such as
//!
//! ```text
//! - cat (97%): [10, 10, 100, 100]
//! 2. dog 0.85 at (120, 40, 200, 160)
//! traffic light: confidence 0.6 [5, 5, 20, 60]
//! ```
//!
//! Boxes are always read as `[x_min, y_min, x_max, y_max]`.

use std::sync::LazyLock;

use regex::Regex;

use super::{Candidate, Located, RawBox, RawConfidence};

static DETECTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\W\d]*(?P<label>[A-Za-z][A-Za-z0-9 _\-]*?)\s*[:\-]?\s*\(?\s*(?:confidence\s*[:=]?\s*)?(?P<conf>\d*\.?\d+)\s*(?P<pct>%)?\s*\)?\s*[:,\-]?\s*(?:at\s*)?[\[(]\s*(?P<a>-?\d*\.?\d+)\s*,\s*(?P<b>-?\d*\.?\d+)\s*,\s*(?P<c>-?\d*\.?\d+)\s*,\s*(?P<d>-?\d*\.?\d+)\s*[\])]",
    )
    .expect("detection line pattern is valid")
});

pub(crate) fn locate(raw: &str) -> Located {
    let entries: Vec<Option<Candidate>> = raw
        .lines()
        .filter_map(|line| DETECTION_LINE.captures(line))
        .filter_map(|caps| {
            let number = |name: &str| caps.name(name)?.as_str().parse::<f64>().ok();
            let values = [number("a")?, number("b")?, number("c")?, number("d")?];

            let conf = caps.name("conf")?.as_str();
            let confidence = if caps.name("pct").is_some() {
                RawConfidence::Text(format!("{conf}%"))
            } else {
                RawConfidence::Text(conf.to_string())
            };

            Some(Some(Candidate {
                label: Some(caps["label"].trim().to_string()),
                confidence,
                bbox: Some(RawBox::xyxy(values)),
            }))
        })
        .collect();

    if entries.is_empty() {
        Located::Nothing
    } else {
        Located::List(entries)
    }
}
