// src/validation.rs
//! Content validation for analyzed photos.
//!
//! Pure functions over a [`VisionAnalysis`]: no I/O, no hidden state. A hard
//! block (no face, explicit content) prevents generation entirely; advisories
//! merely degrade confidence and are reported alongside a valid result.

use crate::models::{ValidationResult, VisionAnalysis};

/// Minimum detection confidence before we advise a clearer photo.
const MIN_FACE_CONFIDENCE: f32 = 0.5;
/// Face bounding boxes smaller than this (either side, in pixels) are
/// unlikely to restyle well.
const MIN_FACE_BOX_PX: i32 = 100;
const MAX_PAN_ANGLE: f32 = 45.0;
const MAX_TILT_ANGLE: f32 = 30.0;
/// Mean channel value below which the dominant color counts as very dark.
const DARK_BRIGHTNESS: f32 = 30.0;

/// Decide whether an analyzed image is eligible for transformation.
///
/// Rules are ordered; the first blocking rule wins and short-circuits. The
/// advisory list is accumulated independently of validity.
pub fn validate(analysis: &VisionAnalysis) -> ValidationResult {
    let faces = &analysis.face_annotations;
    let mut result = ValidationResult {
        is_valid: true,
        has_detected_face: !faces.is_empty(),
        is_safe_content: true,
        face_count: faces.len(),
        error_message: None,
        warnings: Vec::new(),
    };

    if faces.is_empty() {
        result.is_valid = false;
        result.error_message = Some(
            "No face detected in the image. Please use a photo with a clear, visible face."
                .to_string(),
        );
        return result;
    }

    if faces.len() > 1 {
        result.warnings.push(format!(
            "Multiple faces detected ({}). The hairstyle will be applied to the primary face.",
            faces.len()
        ));
    }

    let primary = &faces[0];
    if let Some(confidence) = primary.detection_confidence {
        if confidence < MIN_FACE_CONFIDENCE {
            result.warnings.push(
                "Face detection confidence is low. Try using a clearer photo for better results."
                    .to_string(),
            );
        }
    }

    if let Some(safe) = &analysis.safe_search_annotation {
        if safe.adult.level() >= 3 || safe.violence.level() >= 3 {
            result.is_valid = false;
            result.is_safe_content = false;
            result.error_message =
                Some("Image contains inappropriate content and cannot be processed.".to_string());
            return result;
        }

        if safe.racy.level() >= 4 {
            result.is_valid = false;
            result.is_safe_content = false;
            result.error_message = Some(
                "Image may contain inappropriate content and cannot be processed.".to_string(),
            );
            return result;
        }

        if safe.adult.level() == 2 || safe.racy.level() == 3 {
            result.warnings.push(
                "Image may contain suggestive content. Please use appropriate photos.".to_string(),
            );
        }
    }

    if let Some(props) = &analysis.image_properties_annotation {
        if let Some(top) = props
            .dominant_colors
            .as_ref()
            .and_then(|d| d.colors.first())
        {
            let covers_most = top.pixel_fraction.unwrap_or(0.0) > 0.5;
            if let (true, Some(color)) = (covers_most, top.color.as_ref()) {
                let brightness = (color.red + color.green + color.blue) / 3.0;
                if brightness < DARK_BRIGHTNESS {
                    result.warnings.push(
                        "Image appears very dark. Better lighting may improve results."
                            .to_string(),
                    );
                }
            }
        }
    }

    result
}

/// Quality pass over the primary face. Every finding is advisory; none blocks
/// the pipeline.
pub fn assess_quality(analysis: &VisionAnalysis) -> Vec<String> {
    let mut suggestions = Vec::new();
    let Some(face) = analysis.face_annotations.first() else {
        return suggestions;
    };

    if let Some(poly) = &face.bounding_poly {
        let vertices = &poly.vertices;
        if vertices.len() >= 3 {
            let width = (vertices[1].x - vertices[0].x).abs();
            let height = (vertices[2].y - vertices[1].y).abs();
            if width < MIN_FACE_BOX_PX || height < MIN_FACE_BOX_PX {
                suggestions.push(
                    "Face appears small in the image. Try using a closer photo for better results."
                        .to_string(),
                );
            }
        }
    }

    if face.pan_angle.map(f32::abs).unwrap_or(0.0) > MAX_PAN_ANGLE {
        suggestions.push("Face is turned significantly. Front-facing photos work best.".to_string());
    }

    if face.tilt_angle.map(f32::abs).unwrap_or(0.0) > MAX_TILT_ANGLE {
        suggestions.push("Face is tilted significantly. Level photos work best.".to_string());
    }

    if face.under_exposed_likelihood.level() >= 3 {
        suggestions.push("Image appears underexposed. Try a brighter photo.".to_string());
    }

    if face.blurred_likelihood.level() >= 3 {
        suggestions.push("Image appears blurry. Try a sharper photo.".to_string());
    }

    suggestions
}

/// Hair-related labels from the analysis, most confident first, capped at 5.
/// Used as display context alongside the validation outcome.
pub fn extract_hair_labels(analysis: &VisionAnalysis) -> Vec<String> {
    const HAIR_KEYWORDS: &[&str] = &[
        "hair",
        "hairstyle",
        "haircut",
        "bangs",
        "ponytail",
        "braid",
        "beard",
        "mustache",
        "long hair",
        "short hair",
        "curly",
        "straight",
        "wavy",
    ];

    analysis
        .label_annotations
        .iter()
        .filter(|l| {
            let desc = l.description.to_lowercase();
            HAIR_KEYWORDS.iter().any(|k| desc.contains(k))
        })
        .filter(|l| l.score.unwrap_or(0.0) > 0.7)
        .take(5)
        .map(|l| l.description.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BoundingPoly, ColorInfo, DominantColors, FaceAnnotation, ImageProperties, LabelAnnotation,
        Likelihood, RgbColor, SafeSearchAnnotation, Vertex,
    };

    fn face(confidence: f32) -> FaceAnnotation {
        FaceAnnotation {
            detection_confidence: Some(confidence),
            ..Default::default()
        }
    }

    fn all_unlikely() -> SafeSearchAnnotation {
        SafeSearchAnnotation {
            adult: Likelihood::VeryUnlikely,
            spoof: Likelihood::VeryUnlikely,
            medical: Likelihood::VeryUnlikely,
            violence: Likelihood::VeryUnlikely,
            racy: Likelihood::VeryUnlikely,
        }
    }

    #[test]
    fn no_face_blocks() {
        let analysis = VisionAnalysis {
            safe_search_annotation: Some(all_unlikely()),
            ..Default::default()
        };
        let result = validate(&analysis);
        assert!(!result.is_valid);
        assert!(!result.has_detected_face);
        assert_eq!(result.face_count, 0);
        assert!(result.error_message.as_ref().unwrap().contains("No face detected"));
    }

    #[test]
    fn clean_single_face_passes_without_warnings() {
        let analysis = VisionAnalysis {
            face_annotations: vec![face(0.9)],
            safe_search_annotation: Some(all_unlikely()),
            ..Default::default()
        };
        let result = validate(&analysis);
        assert!(result.is_valid);
        assert!(result.has_detected_face);
        assert!(result.is_safe_content);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn multiple_faces_warn_with_count() {
        let analysis = VisionAnalysis {
            face_annotations: vec![
                FaceAnnotation::default(),
                FaceAnnotation::default(),
                FaceAnnotation::default(),
            ],
            safe_search_annotation: Some(all_unlikely()),
            ..Default::default()
        };
        let result = validate(&analysis);
        assert!(result.is_valid);
        assert_eq!(result.face_count, 3);
        assert!(result.warnings.iter().any(|w| w.contains("Multiple faces detected (3)")));
    }

    #[test]
    fn likely_adult_or_violence_blocks() {
        for field in ["adult", "violence"] {
            let mut safe = all_unlikely();
            match field {
                "adult" => safe.adult = Likelihood::Likely,
                _ => safe.violence = Likelihood::Likely,
            }
            let analysis = VisionAnalysis {
                face_annotations: vec![face(0.9)],
                safe_search_annotation: Some(safe),
                ..Default::default()
            };
            let result = validate(&analysis);
            assert!(!result.is_valid, "{field} at Likely should block");
            assert!(!result.is_safe_content);
            assert!(result
                .error_message
                .as_ref()
                .unwrap()
                .contains("inappropriate content"));
        }
    }

    #[test]
    fn very_likely_racy_blocks_but_likely_only_warns() {
        let mut safe = all_unlikely();
        safe.racy = Likelihood::VeryLikely;
        let blocked = validate(&VisionAnalysis {
            face_annotations: vec![face(0.9)],
            safe_search_annotation: Some(safe),
            ..Default::default()
        });
        assert!(!blocked.is_valid);
        assert!(blocked
            .error_message
            .as_ref()
            .unwrap()
            .starts_with("Image may contain"));

        let mut safe = all_unlikely();
        safe.racy = Likelihood::Likely;
        let warned = validate(&VisionAnalysis {
            face_annotations: vec![face(0.9)],
            safe_search_annotation: Some(safe),
            ..Default::default()
        });
        assert!(warned.is_valid);
        assert!(warned.warnings.iter().any(|w| w.contains("suggestive")));
    }

    #[test]
    fn low_confidence_warns() {
        let analysis = VisionAnalysis {
            face_annotations: vec![face(0.3)],
            safe_search_annotation: Some(all_unlikely()),
            ..Default::default()
        };
        let result = validate(&analysis);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("confidence is low")));
    }

    #[test]
    fn dark_dominant_color_warns() {
        let analysis = VisionAnalysis {
            face_annotations: vec![face(0.9)],
            safe_search_annotation: Some(all_unlikely()),
            image_properties_annotation: Some(ImageProperties {
                dominant_colors: Some(DominantColors {
                    colors: vec![ColorInfo {
                        color: Some(RgbColor {
                            red: 10.0,
                            green: 12.0,
                            blue: 8.0,
                        }),
                        pixel_fraction: Some(0.8),
                    }],
                }),
            }),
            ..Default::default()
        };
        let result = validate(&analysis);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("very dark")));
    }

    #[test]
    fn validation_is_idempotent() {
        let analysis = VisionAnalysis {
            face_annotations: vec![face(0.4), FaceAnnotation::default()],
            safe_search_annotation: Some(all_unlikely()),
            ..Default::default()
        };
        assert_eq!(validate(&analysis), validate(&analysis));
    }

    #[test]
    fn invalid_always_carries_a_message() {
        // Every blocking path must set error_message.
        let blocked = [
            VisionAnalysis::default(),
            VisionAnalysis {
                face_annotations: vec![face(0.9)],
                safe_search_annotation: Some(SafeSearchAnnotation {
                    adult: Likelihood::VeryLikely,
                    ..all_unlikely()
                }),
                ..Default::default()
            },
            VisionAnalysis {
                face_annotations: vec![face(0.9)],
                safe_search_annotation: Some(SafeSearchAnnotation {
                    racy: Likelihood::VeryLikely,
                    ..all_unlikely()
                }),
                ..Default::default()
            },
        ];
        for analysis in &blocked {
            let result = validate(analysis);
            assert!(!result.is_valid);
            assert!(result.error_message.as_deref().is_some_and(|m| !m.is_empty()));
        }
    }

    fn boxed_face(width: i32, height: i32) -> FaceAnnotation {
        FaceAnnotation {
            bounding_poly: Some(BoundingPoly {
                vertices: vec![
                    Vertex { x: 0, y: 0 },
                    Vertex { x: width, y: 0 },
                    Vertex { x: width, y: height },
                    Vertex { x: 0, y: height },
                ],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn quality_flags_small_faces_and_extreme_angles() {
        let analysis = VisionAnalysis {
            face_annotations: vec![FaceAnnotation {
                pan_angle: Some(60.0),
                tilt_angle: Some(-40.0),
                ..boxed_face(80, 80)
            }],
            ..Default::default()
        };
        let suggestions = assess_quality(&analysis);
        assert!(suggestions.iter().any(|s| s.contains("small")));
        assert!(suggestions.iter().any(|s| s.contains("turned")));
        assert!(suggestions.iter().any(|s| s.contains("tilted")));
    }

    #[test]
    fn quality_flags_exposure_and_blur() {
        let analysis = VisionAnalysis {
            face_annotations: vec![FaceAnnotation {
                under_exposed_likelihood: Likelihood::Likely,
                blurred_likelihood: Likelihood::VeryLikely,
                ..boxed_face(400, 400)
            }],
            ..Default::default()
        };
        let suggestions = assess_quality(&analysis);
        assert!(suggestions.iter().any(|s| s.contains("underexposed")));
        assert!(suggestions.iter().any(|s| s.contains("blurry")));
    }

    #[test]
    fn quality_is_silent_on_good_photos() {
        let analysis = VisionAnalysis {
            face_annotations: vec![FaceAnnotation {
                pan_angle: Some(5.0),
                tilt_angle: Some(-3.0),
                ..boxed_face(400, 500)
            }],
            ..Default::default()
        };
        assert!(assess_quality(&analysis).is_empty());
        assert!(assess_quality(&VisionAnalysis::default()).is_empty());
    }

    #[test]
    fn hair_labels_filter_by_keyword_and_score() {
        let label = |d: &str, s: f32| LabelAnnotation {
            description: d.to_string(),
            score: Some(s),
        };
        let analysis = VisionAnalysis {
            label_annotations: vec![
                label("Long hair", 0.95),
                label("Beard", 0.85),
                label("Hairstyle", 0.6),
                label("Smile", 0.99),
                label("Ponytail", 0.8),
            ],
            ..Default::default()
        };
        let labels = extract_hair_labels(&analysis);
        assert_eq!(labels, vec!["Long hair", "Beard", "Ponytail"]);
    }
}
