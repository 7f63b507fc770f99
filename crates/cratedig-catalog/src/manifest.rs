// SPDX-License-Identifier: GPL-3.0-or-later
//! Stream manifest decoding (spec §4.2). The upstream returns a
//! base64-encoded manifest alongside a declared MIME type: either a small
//! JSON object naming one or more direct URLs (`audio/flac`), or a DASH XML
//! manifest describing a segmented stream (`audio/mp4`).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Deserialize;

use crate::error::{CatalogError, Result};

/// What a decoded manifest resolves to: either one URL to stream directly,
/// or an ordered list of segment URLs (an initialization segment followed
/// by numbered media segments) to concatenate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPlan {
    Direct { url: String, mime: &'static str },
    Segmented { urls: Vec<String>, mime: &'static str },
}

#[derive(Debug, Deserialize)]
struct DirectManifest {
    urls: Vec<String>,
}

/// Decodes `base64_manifest` per `declared_mime`. `audio/flac` selects the
/// JSON URL-list format; `audio/mp4` selects DASH XML. Any other MIME is an
/// error — there is no sensible fallback.
pub fn decode(declared_mime: &str, base64_manifest: &str) -> Result<StreamPlan> {
    let raw = BASE64
        .decode(base64_manifest.trim())
        .map_err(|e| CatalogError::MalformedManifest(format!("invalid base64: {e}")))?;

    match declared_mime {
        "audio/flac" => {
            let manifest: DirectManifest = serde_json::from_slice(&raw).map_err(|e| {
                CatalogError::MalformedManifest(format!("invalid url-list manifest: {e}"))
            })?;
            let url = manifest
                .urls
                .into_iter()
                .next()
                .ok_or_else(|| CatalogError::MalformedManifest("no urls in manifest".into()))?;
            Ok(StreamPlan::Direct {
                url,
                mime: "audio/flac",
            })
        }
        "audio/mp4" => {
            let xml = String::from_utf8(raw)
                .map_err(|e| CatalogError::MalformedManifest(format!("manifest not utf-8: {e}")))?;
            let urls = decode_dash(&xml)?;
            Ok(StreamPlan::Segmented {
                urls,
                mime: "audio/mp4",
            })
        }
        other => Err(CatalogError::UnsupportedMime(other.to_string())),
    }
}

#[derive(Debug, Default)]
struct SegmentTemplate {
    initialization: Option<String>,
    media: Option<String>,
    start_number: u64,
    timeline: Vec<(u64, u64)>, // (duration, repeat_count "r", already expanded to inclusive count)
}

fn decode_dash(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut base_url: Option<String> = None;
    let mut template = SegmentTemplate {
        start_number: 1,
        ..Default::default()
    };
    let mut in_base_url = false;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| CatalogError::MalformedManifest(format!("xml parse error: {e}")))?
        {
            Event::Start(tag) | Event::Empty(tag) => {
                let name = String::from_utf8_lossy(tag.local_name().as_ref()).to_string();
                match name.as_str() {
                    "BaseURL" => in_base_url = true,
                    "SegmentTemplate" => {
                        for attr in tag.attributes().flatten() {
                            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
                            let value = attr
                                .unescape_value()
                                .unwrap_or_default()
                                .to_string();
                            match key.as_str() {
                                "initialization" => template.initialization = Some(value),
                                "media" => template.media = Some(value),
                                "startNumber" => {
                                    template.start_number = value.parse().unwrap_or(1);
                                }
                                _ => {}
                            }
                        }
                    }
                    "S" => {
                        let mut d: Option<u64> = None;
                        let mut r: u64 = 0;
                        for attr in tag.attributes().flatten() {
                            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
                            let value = attr
                                .unescape_value()
                                .unwrap_or_default()
                                .to_string();
                            match key.as_str() {
                                "d" => d = value.parse().ok(),
                                "r" => r = value.parse().unwrap_or(0),
                                _ => {}
                            }
                        }
                        if let Some(d) = d {
                            // `r` repetitions means 1+r total occurrences of this entry.
                            template.timeline.push((d, 1 + r));
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(text) if in_base_url => {
                base_url = Some(text.unescape().unwrap_or_default().to_string());
                in_base_url = false;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(url) = base_url {
        return Ok(vec![url]);
    }

    let media = template
        .media
        .ok_or_else(|| CatalogError::MalformedManifest("DASH manifest has neither BaseURL nor SegmentTemplate media".into()))?;

    let mut urls = Vec::new();
    if let Some(init) = template.initialization {
        urls.push(init);
    }

    let total_segments: u64 = template.timeline.iter().map(|(_, count)| count).sum();
    let total_segments = if total_segments == 0 { 1 } else { total_segments };
    for offset in 0..total_segments {
        let number = template.start_number + offset;
        urls.push(media.replace("$Number$", &number.to_string()));
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_direct_url_list_manifest() {
        let json = serde_json::json!({"urls": ["https://cdn/track.flac"]}).to_string();
        let encoded = BASE64.encode(json);
        let plan = decode("audio/flac", &encoded).unwrap();
        assert_eq!(
            plan,
            StreamPlan::Direct {
                url: "https://cdn/track.flac".to_string(),
                mime: "audio/flac"
            }
        );
    }

    #[test]
    fn decodes_dash_manifest_with_base_url() {
        let xml = r#"<MPD><Period><AdaptationSet><Representation><BaseURL>https://cdn/track.mp4</BaseURL></Representation></AdaptationSet></Period></MPD>"#;
        let encoded = BASE64.encode(xml);
        let plan = decode("audio/mp4", &encoded).unwrap();
        assert_eq!(
            plan,
            StreamPlan::Segmented {
                urls: vec!["https://cdn/track.mp4".to_string()],
                mime: "audio/mp4"
            }
        );
    }

    #[test]
    fn decodes_dash_manifest_with_segment_template_and_timeline_repeats() {
        let xml = r#"<MPD><Period><AdaptationSet><Representation>
            <SegmentTemplate initialization="https://cdn/init.mp4" media="https://cdn/seg-$Number$.mp4" startNumber="1">
                <SegmentTimeline>
                    <S d="1000" r="2"/>
                    <S d="500"/>
                </SegmentTimeline>
            </SegmentTemplate>
        </Representation></AdaptationSet></Period></MPD>"#;
        let encoded = BASE64.encode(xml);
        let plan = decode("audio/mp4", &encoded).unwrap();
        match plan {
            StreamPlan::Segmented { urls, .. } => {
                // init + 3 repeats of first S + 1 of second S == 5 urls
                assert_eq!(urls.len(), 5);
                assert_eq!(urls[0], "https://cdn/init.mp4");
                assert_eq!(urls[1], "https://cdn/seg-1.mp4");
                assert_eq!(urls[4], "https://cdn/seg-4.mp4");
            }
            other => panic!("expected segmented plan, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_mime() {
        let result = decode("audio/ogg", "Zm9v");
        assert!(matches!(result, Err(CatalogError::UnsupportedMime(_))));
    }
}
