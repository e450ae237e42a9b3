// src/prompt.rs
//! Instruction construction for the image transformation model.
//!
//! Deterministic string building: same inputs, same instruction. The
//! preservation and requirements sections are always emitted because
//! generative models otherwise drift the whole image, not just the hair.

use thiserror::Error;

use crate::models::ValidationResult;

/// Combined length cap for the user's color and style intent.
pub const MAX_INPUT_LEN: usize = 200;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputError {
    #[error("Please enter at least a hair color or hairstyle preference.")]
    EmptyInput,

    #[error("Input is too long. Please keep your preferences under {max} characters.")]
    TooLong { max: usize },
}

/// Reject unusable style intent before any generation call is attempted.
pub fn validate_input(hair_color: &str, hair_style: &str) -> Result<(), InputError> {
    let color = hair_color.trim();
    let style = hair_style.trim();

    if color.is_empty() && style.is_empty() {
        return Err(InputError::EmptyInput);
    }

    if color.len() + style.len() + 1 > MAX_INPUT_LEN {
        return Err(InputError::TooLong { max: MAX_INPUT_LEN });
    }

    Ok(())
}

/// Render the transformation instruction.
///
/// Section order is fixed: hair-only directive, the user's requested changes,
/// preservation list, output requirements, and a primary-face note when the
/// validation context saw more than one face.
pub fn build_restyle_prompt(
    hair_color: &str,
    hair_style: &str,
    validation: Option<&ValidationResult>,
) -> String {
    let color = hair_color.trim();
    let style = hair_style.trim();
    let mut parts: Vec<String> = Vec::new();

    parts.push("Modify ONLY the hair in this image.".to_string());
    parts.push(String::new());

    if !color.is_empty() {
        parts.push(format!("Change the hair color to: {color}"));
    }
    if !style.is_empty() {
        parts.push(format!("Change the hairstyle to: {style}"));
    }
    if color.is_empty() && style.is_empty() {
        // Unreachable behind validate_input, but degrade gracefully rather
        // than emit an empty instruction.
        parts.push("Apply a creative hairstyle transformation.".to_string());
    }

    parts.push(String::new());
    parts.push("PRESERVE EXACTLY:".to_string());
    parts.push("- All facial features (eyes, nose, mouth, face shape)".to_string());
    parts.push("- Skin tone, makeup, and facial hair (unless specified to change)".to_string());
    parts.push("- Expression and emotion".to_string());
    parts.push("- Clothing, accessories, and jewelry".to_string());
    parts.push("- Background and environment".to_string());
    parts.push("- Lighting, shadows, and photo quality".to_string());
    parts.push("- Camera angle and composition".to_string());
    parts.push("- Body position and pose".to_string());
    parts.push(String::new());

    parts.push("REQUIREMENTS:".to_string());
    parts.push("- Generate a photorealistic result".to_string());
    parts.push("- Make the new hairstyle look natural and realistic".to_string());
    parts.push("- Match the original image quality and resolution".to_string());
    parts.push("- Ensure proper shadows and highlights on the new hair".to_string());
    parts.push("- The result should look like the same person with a new hairstyle".to_string());
    parts.push("- Do not add any text, watermarks, or logos".to_string());

    if let Some(v) = validation {
        if v.face_count > 1 {
            parts.push(String::new());
            parts.push(format!(
                "Note: Multiple faces detected ({}). Focus on the primary/central face.",
                v.face_count
            ));
        }
    }

    parts.join("\n")
}
