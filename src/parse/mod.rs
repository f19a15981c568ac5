//! Turning a vision model's answer into validated detections.
//!
//! The model is asked for a JSON array, but what comes back ranges from
//! clean JSON to JSON wrapped in markdown to a bulleted prose list. Parsing
//! therefore happens in two passes:
//!
//! 1. [`structured`] looks for a JSON value that holds a list of objects.
//! 2. If nothing list-shaped is found, [`textual`] scans the text line by
//!    line for `label confidence [x1, y1, x2, y2]` patterns.
//!
//! Both passes produce loosely typed [`Candidate`]s that go through the same
//! validation: confidence coercion, box convention handling, normalized
//! coordinate scaling, clamping, and degenerate-box rejection. Survivors get
//! a color from the palette in the order they were found.

mod report;
mod structured;
mod textual;

pub use report::{IssueCode, IssueContext, ParseIssue, ParseReport, Severity};

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::color::ColorPalette;
use crate::detection::Detection;
use crate::geometry::{BBoxXYXY, Normalized, Pixel};

/// Why a response yielded nothing drawable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    /// A detection list was found, but no entry survived validation (or it was empty).
    #[error("no usable detections in the response")]
    NoDetectionsFound,
    /// Nothing resembling a detection list was found at all.
    #[error("response did not contain a recognizable detection list")]
    UnparsableResponse,
}

/// How the detections were recovered.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseHit {
    /// Detections came from a JSON value in the response.
    Structured(Vec<Detection>),
    /// No JSON list was found; detections were scraped from the text.
    TextualFallback(Vec<Detection>),
    Failure(ParseFailure),
}

/// Parse mode label used in logs and reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    Structured,
    TextualFallback,
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMode::Structured => write!(f, "structured"),
            ParseMode::TextualFallback => write!(f, "textual fallback"),
        }
    }
}

/// The outcome of parsing one response.
#[derive(Clone, Debug)]
pub struct ParsedResponse {
    pub hit: ParseHit,
    pub report: ParseReport,
}

impl ParsedResponse {
    /// Returns true when the detections came from the textual fallback.
    pub fn is_partial(&self) -> bool {
        matches!(self.hit, ParseHit::TextualFallback(_))
    }

    /// Borrow the detections, empty on failure.
    pub fn detections(&self) -> &[Detection] {
        match &self.hit {
            ParseHit::Structured(d) | ParseHit::TextualFallback(d) => d,
            ParseHit::Failure(_) => &[],
        }
    }

    /// Collapses the hit into detections plus how they were found.
    ///
    /// `Failure` becomes `Err`; both successful variants become `Ok` tagged
    /// with their [`ParseMode`].
    pub fn into_result(self) -> Result<(Vec<Detection>, ParseMode), ParseFailure> {
        match self.hit {
            ParseHit::Structured(d) => Ok((d, ParseMode::Structured)),
            ParseHit::TextualFallback(d) => Ok((d, ParseMode::TextualFallback)),
            ParseHit::Failure(failure) => Err(failure),
        }
    }
}

/// Box layout of a raw candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BoxConvention {
    /// `[x_min, y_min, x_max, y_max]`
    Xyxy,
    /// `[x, y, width, height]` with `(x, y)` the top-left corner.
    Xywh,
}

/// Four numbers plus the convention they were given in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RawBox {
    pub values: [f64; 4],
    pub convention: BoxConvention,
}

impl RawBox {
    pub fn xyxy(values: [f64; 4]) -> Self {
        Self {
            values,
            convention: BoxConvention::Xyxy,
        }
    }

    pub fn xywh(values: [f64; 4]) -> Self {
        Self {
            values,
            convention: BoxConvention::Xywh,
        }
    }

    fn to_xyxy<TSpace>(self) -> BBoxXYXY<TSpace> {
        let [a, b, c, d] = self.values;
        match self.convention {
            BoxConvention::Xyxy => BBoxXYXY::from_xyxy(a, b, c, d),
            BoxConvention::Xywh => BBoxXYXY::from_xywh(a, b, c, d),
        }
    }
}

/// Confidence as the model wrote it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RawConfidence {
    Number(f64),
    Text(String),
    Missing,
}

impl RawConfidence {
    /// Coerces to a probability in `[0, 1]`.
    ///
    /// Strings may carry a trailing `%`, in which case they are divided by 100.
    fn coerce(&self) -> Option<f64> {
        let value = match self {
            RawConfidence::Number(n) => *n,
            RawConfidence::Text(raw) => {
                let trimmed = raw.trim();
                match trimmed.strip_suffix('%') {
                    Some(percent) => percent.trim().parse::<f64>().ok()? / 100.0,
                    None => trimmed.parse::<f64>().ok()?,
                }
            }
            RawConfidence::Missing => return None,
        };
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(value)
    }
}

impl fmt::Display for RawConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawConfidence::Number(n) => write!(f, "{n}"),
            RawConfidence::Text(s) => write!(f, "'{s}'"),
            RawConfidence::Missing => write!(f, "<missing>"),
        }
    }
}

/// One object the model mentioned, before validation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Candidate {
    pub label: Option<String>,
    pub confidence: RawConfidence,
    pub bbox: Option<RawBox>,
}

/// What a pass found before validation.
pub(crate) enum Located {
    /// A list was found; `None` marks elements that were not objects.
    List(Vec<Option<Candidate>>),
    Nothing,
}

/// Parses a raw model response into validated detections.
///
/// `image_width` and `image_height` are the source image's pixel size; they
/// are used to scale normalized boxes and to clamp everything into frame.
/// Colors are taken from `palette` only for detections that survive.
pub fn parse_response(
    raw: &str,
    image_width: u32,
    image_height: u32,
    palette: &mut ColorPalette,
) -> ParsedResponse {
    let mut report = ParseReport::new();

    let (mode, located) = match structured::locate(raw) {
        Located::List(entries) => (ParseMode::Structured, entries),
        Located::Nothing => match textual::locate(raw) {
            Located::List(entries) => (ParseMode::TextualFallback, entries),
            Located::Nothing => {
                report.add(ParseIssue::error(
                    IssueCode::NoDetectionList,
                    "no JSON detection list and no recognizable detection lines",
                    IssueContext::Response,
                ));
                return ParsedResponse {
                    hit: ParseHit::Failure(ParseFailure::UnparsableResponse),
                    report,
                };
            }
        },
    };

    debug!(
        mode = %mode,
        candidates = located.len(),
        "located detection candidates"
    );

    let mut detections = Vec::with_capacity(located.len());
    for (index, entry) in located.into_iter().enumerate() {
        let context = IssueContext::Candidate { index };
        let Some(candidate) = entry else {
            report.add(ParseIssue::error(
                IssueCode::NotAnObject,
                "list element is not an object",
                context,
            ));
            continue;
        };

        if let Some((label, confidence, bbox)) =
            validate_candidate(&candidate, image_width, image_height, &context, &mut report)
        {
            detections.push(Detection {
                label,
                confidence,
                bbox,
                color: palette.next_color(),
            });
        }
    }

    let hit = if detections.is_empty() {
        ParseHit::Failure(ParseFailure::NoDetectionsFound)
    } else {
        match mode {
            ParseMode::Structured => ParseHit::Structured(detections),
            ParseMode::TextualFallback => ParseHit::TextualFallback(detections),
        }
    };

    ParsedResponse { hit, report }
}

/// Applies the validation rules to a single candidate.
///
/// Returns `None` (after recording an error issue) when the candidate must
/// be dropped.
fn validate_candidate(
    candidate: &Candidate,
    image_width: u32,
    image_height: u32,
    context: &IssueContext,
    report: &mut ParseReport,
) -> Option<(String, f64, BBoxXYXY<Pixel>)> {
    let label = candidate
        .label
        .as_deref()
        .map(str::trim)
        .filter(|label| !label.is_empty());
    let Some(label) = label else {
        report.add(ParseIssue::error(
            IssueCode::MissingLabel,
            "missing or empty label",
            context.clone(),
        ));
        return None;
    };

    let Some(confidence) = candidate.confidence.coerce() else {
        report.add(ParseIssue::error(
            IssueCode::InvalidConfidence,
            format!(
                "confidence {} for '{}' is not a number in [0, 1]",
                candidate.confidence, label
            ),
            context.clone(),
        ));
        return None;
    };

    let Some(raw_box) = candidate.bbox else {
        report.add(ParseIssue::error(
            IssueCode::MissingBox,
            format!("no box coordinates for '{}'", label),
            context.clone(),
        ));
        return None;
    };

    let as_given: BBoxXYXY<Normalized> = raw_box.to_xyxy();
    if !as_given.is_finite() {
        report.add(ParseIssue::error(
            IssueCode::BBoxNotFinite,
            format!("non-finite coordinates {:?}", raw_box.values),
            context.clone(),
        ));
        return None;
    }

    let ordered = as_given.ordered();
    if ordered != as_given {
        report.add(ParseIssue::warning(
            IssueCode::ReorderedCorners,
            format!("swapped inverted corners {:?}", raw_box.values),
            context.clone(),
        ));
    }

    // Pixel boxes on anything bigger than 1x1 almost never fit in [0, 1].
    // 1.0 maps to the last pixel index, so full-extent boxes need no clamping.
    let pixel: BBoxXYXY<Pixel> = if ordered.is_unit() {
        report.add(ParseIssue::warning(
            IssueCode::NormalizedBox,
            format!(
                "treated {:?} as normalized and scaled to {}x{}",
                raw_box.values, image_width, image_height
            ),
            context.clone(),
        ));
        ordered.to_pixel(
            image_width.saturating_sub(1) as f64,
            image_height.saturating_sub(1) as f64,
        )
    } else {
        BBoxXYXY::from_xyxy(ordered.xmin(), ordered.ymin(), ordered.xmax(), ordered.ymax())
    };

    let snapped = pixel.snap_outward();
    let clamped = snapped.clamp_to(image_width, image_height);
    if clamped != snapped {
        report.add(ParseIssue::warning(
            IssueCode::BBoxClamped,
            format!(
                "box ({:.1}, {:.1}, {:.1}, {:.1}) clamped to image bounds {}x{}",
                snapped.xmin(),
                snapped.ymin(),
                snapped.xmax(),
                snapped.ymax(),
                image_width,
                image_height
            ),
            context.clone(),
        ));
    }

    if !clamped.fits_within(image_width, image_height) {
        report.add(ParseIssue::error(
            IssueCode::DegenerateBox,
            format!(
                "box for '{}' has no area inside the image: ({}, {}, {}, {})",
                label,
                clamped.xmin(),
                clamped.ymin(),
                clamped.xmax(),
                clamped.ymax()
            ),
            context.clone(),
        ));
        return None;
    }

    Some((label.to_string(), confidence, clamped))
}

/// Fuzz-only entrypoint for response parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_response(input: &str) {
    let mut palette = ColorPalette::seeded(0);
    let parsed = parse_response(input, 640, 480, &mut palette);
    for detection in parsed.detections() {
        assert!(detection.bbox.fits_within(640, 480));
        assert!((0.0..=1.0).contains(&detection.confidence));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str, w: u32, h: u32) -> ParsedResponse {
        let mut palette = ColorPalette::seeded(11);
        parse_response(raw, w, h, &mut palette)
    }

    #[test]
    fn parses_clean_json_array() {
        let parsed = parse(
            r#"[{"label":"cat","confidence":0.97,"box":[10,10,100,100]}]"#,
            640,
            480,
        );
        let ParseHit::Structured(detections) = &parsed.hit else {
            panic!("expected structured hit, got {:?}", parsed.hit);
        };
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "cat");
        assert_eq!(detections[0].confidence, 0.97);
        assert_eq!(
            detections[0].bbox,
            BBoxXYXY::from_xyxy(10.0, 10.0, 100.0, 100.0)
        );
        assert!(parsed.report.is_clean());
    }

    #[test]
    fn garbage_is_unparsable() {
        let parsed = parse("I'm sorry, I can't see anything useful here.", 640, 480);
        assert_eq!(parsed.hit, ParseHit::Failure(ParseFailure::UnparsableResponse));
        assert_eq!(
            parsed.into_result().unwrap_err(),
            ParseFailure::UnparsableResponse
        );
    }

    #[test]
    fn empty_list_is_no_detections() {
        let parsed = parse("```json\n[]\n```", 640, 480);
        assert_eq!(parsed.hit, ParseHit::Failure(ParseFailure::NoDetectionsFound));
    }

    #[test]
    fn all_candidates_dropped_is_no_detections() {
        let parsed = parse(
            r#"[{"label":"cat","confidence":"high","box":[10,10,100,100]}]"#,
            640,
            480,
        );
        assert_eq!(parsed.hit, ParseHit::Failure(ParseFailure::NoDetectionsFound));
        assert!(parsed.report.has(IssueCode::InvalidConfidence));
    }

    #[test]
    fn confidence_coercion() {
        assert_eq!(RawConfidence::Number(0.5).coerce(), Some(0.5));
        assert_eq!(RawConfidence::Text(" 0.25 ".into()).coerce(), Some(0.25));
        assert_eq!(RawConfidence::Text("97%".into()).coerce(), Some(0.97));
        assert_eq!(RawConfidence::Number(1.2).coerce(), None);
        assert_eq!(RawConfidence::Number(-0.1).coerce(), None);
        assert_eq!(RawConfidence::Number(f64::NAN).coerce(), None);
        assert_eq!(RawConfidence::Text("high".into()).coerce(), None);
        assert_eq!(RawConfidence::Missing.coerce(), None);
    }

    #[test]
    fn out_of_range_boxes_are_clamped() {
        let parsed = parse(
            r#"[{"label":"dog","confidence":0.8,"box":[-20,50,900,700]}]"#,
            640,
            480,
        );
        let detections = parsed.detections();
        assert_eq!(detections.len(), 1);
        assert_eq!(
            detections[0].bbox,
            BBoxXYXY::from_xyxy(0.0, 50.0, 639.0, 479.0)
        );
        assert!(parsed.report.has(IssueCode::BBoxClamped));
    }

    #[test]
    fn boxes_outside_the_frame_are_degenerate() {
        let parsed = parse(
            r#"[{"label":"ghost","confidence":0.8,"box":[700,10,800,40]},
                {"label":"line","confidence":0.8,"box":[30,10,30,40]}]"#,
            640,
            480,
        );
        assert_eq!(parsed.hit, ParseHit::Failure(ParseFailure::NoDetectionsFound));
        assert_eq!(parsed.report.error_count(), 2);
        assert!(parsed.report.has(IssueCode::DegenerateBox));
    }

    #[test]
    fn inverted_corners_are_swapped() {
        let parsed = parse(
            r#"[{"label":"cup","confidence":0.6,"box":[100,90,20,10]}]"#,
            640,
            480,
        );
        assert_eq!(
            parsed.detections()[0].bbox,
            BBoxXYXY::from_xyxy(20.0, 10.0, 100.0, 90.0)
        );
        assert!(parsed.report.has(IssueCode::ReorderedCorners));
    }

    #[test]
    fn normalized_boxes_are_scaled() {
        let parsed = parse(
            r#"[{"label":"nav-bar","confidence":0.9,"bbox":[0.0,0.0,1.0,0.08]}]"#,
            1000,
            500,
        );
        let detection = &parsed.detections()[0];
        assert_eq!(detection.bbox, BBoxXYXY::from_xyxy(0.0, 0.0, 999.0, 40.0));
        assert!(parsed.report.has(IssueCode::NormalizedBox));
    }

    #[test]
    fn full_extent_normalized_box_is_not_clamped() {
        let parsed = parse(
            r#"[{"label":"scene","confidence":0.7,"box":[0,0,1,1]}]"#,
            320,
            240,
        );
        assert_eq!(
            parsed.detections()[0].bbox,
            BBoxXYXY::from_xyxy(0.0, 0.0, 319.0, 239.0)
        );
        assert!(parsed.report.has(IssueCode::NormalizedBox));
        assert!(!parsed.report.has(IssueCode::BBoxClamped));
    }

    #[test]
    fn coordinates_on_separate_lines_are_not_a_detection() {
        let parsed = parse("Item 1\n[10, 10, 100, 100]", 640, 480);
        assert_eq!(parsed.hit, ParseHit::Failure(ParseFailure::UnparsableResponse));
    }

    #[test]
    fn colors_follow_discovery_order() {
        let raw = r#"[
            {"label":"a","confidence":0.9,"box":[1,1,10,10]},
            {"label":"b","confidence":2.0,"box":[1,1,10,10]},
            {"label":"c","confidence":0.9,"box":[1,1,10,10]}
        ]"#;
        let parsed = parse(raw, 64, 64);

        let mut palette = ColorPalette::seeded(11);
        let expected = [palette.next_color(), palette.next_color()];

        let detections = parsed.detections();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "a");
        assert_eq!(detections[1].label, "c");
        assert_eq!(detections[0].color, expected[0]);
        assert_eq!(detections[1].color, expected[1]);
    }

    #[test]
    fn textual_fallback_marks_partial_parse() {
        let raw = "Here is what I found:\n- cat (97%): [10, 10, 100, 100]\n- dog 0.85 [120, 40, 200, 160]\n";
        let parsed = parse(raw, 640, 480);
        assert!(parsed.is_partial());
        let labels: Vec<&str> = parsed
            .detections()
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(labels, ["cat", "dog"]);
        let (_, mode) = parsed.into_result().expect("detections");
        assert_eq!(mode, ParseMode::TextualFallback);
    }

    #[test]
    fn parsing_is_deterministic() {
        let raw = r#"{"detections":[
            {"name":"car","score":"88%","bbox":{"x":5,"y":6,"width":50,"height":40}},
            {"label":"tree","confidence":0.4,"box":[300,10,420,300]}
        ]}"#;
        let first = parse(raw, 640, 480);
        let second = parse(raw, 640, 480);
        assert_eq!(first.hit, second.hit);
    }
}
