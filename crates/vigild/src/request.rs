//! Boundary validation for D-Bus requests. Everything here runs before any
//! inference; a rejected request never reaches the engine.

use image::DynamicImage;
use thiserror::Error;
use vigil_core::identity::validate_embedding;
use vigil_core::{BurstFrame, Embedding};

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("no images supplied")]
    NoImages,
    #[error("too many images: {got} (max {max})")]
    TooManyImages { got: usize, max: usize },
    #[error("action descriptor is blank")]
    BlankAction,
    #[error("image {index} could not be decoded: {source}")]
    UndecodableImage {
        index: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid reference embedding: {0}")]
    InvalidReference(#[from] vigil_core::MatchError),
}

impl From<RequestError> for zbus::fdo::Error {
    fn from(e: RequestError) -> Self {
        zbus::fdo::Error::InvalidArgs(e.to_string())
    }
}

pub fn decode_image(index: usize, bytes: &[u8]) -> Result<DynamicImage, RequestError> {
    image::load_from_memory(bytes).map_err(|source| RequestError::UndecodableImage { index, source })
}

/// Decode a burst, enforcing `1..=max_frames` images.
///
/// A frame that fails to decode stays in the burst as its error message; the
/// pipeline reports it against its index.
pub fn decode_burst(images: &[Vec<u8>], max_frames: usize) -> Result<Vec<BurstFrame>, RequestError> {
    if images.is_empty() {
        return Err(RequestError::NoImages);
    }
    if images.len() > max_frames {
        return Err(RequestError::TooManyImages {
            got: images.len(),
            max: max_frames,
        });
    }
    Ok(images
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            decode_image(i, bytes).map_err(|e| {
                tracing::warn!(frame = i, error = %e, "skipping undecodable frame");
                e.to_string()
            })
        })
        .collect())
}

pub fn check_action(action: &str) -> Result<(), RequestError> {
    if action.trim().is_empty() {
        return Err(RequestError::BlankAction);
    }
    Ok(())
}

/// An empty array means no reference was supplied.
pub fn parse_reference(values: &[f64]) -> Result<Option<Embedding>, RequestError> {
    if values.is_empty() {
        return Ok(None);
    }
    let embedding = Embedding::new(values.iter().map(|&v| v as f32).collect());
    validate_embedding(&embedding)?;
    Ok(Some(embedding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decodes_valid_burst() {
        let images = decode_burst(&[png(4, 3), png(8, 6)], 10).unwrap();
        assert_eq!(images.len(), 2);
        let second = images[1].as_ref().unwrap();
        assert_eq!((second.width(), second.height()), (8, 6));
    }

    #[test]
    fn rejects_empty_and_oversized_bursts() {
        assert!(matches!(decode_burst(&[], 10), Err(RequestError::NoImages)));
        let burst = vec![png(2, 2); 3];
        assert!(matches!(
            decode_burst(&burst, 2),
            Err(RequestError::TooManyImages { got: 3, max: 2 })
        ));
    }

    #[test]
    fn undecodable_frame_stays_in_burst() {
        let burst = vec![png(2, 2), b"not an image".to_vec(), png(3, 3)];
        let frames = decode_burst(&burst, 10).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_ok());
        assert!(frames[2].is_ok());
        let reason = frames[1].as_ref().unwrap_err();
        assert!(reason.starts_with("image 1 could not be decoded"), "{reason}");
    }

    #[test]
    fn single_image_decode_failure_is_rejected() {
        assert!(matches!(
            decode_image(0, b"not an image"),
            Err(RequestError::UndecodableImage { index: 0, .. })
        ));
    }

    #[test]
    fn blank_action_is_rejected() {
        assert!(check_action("TURN_LEFT").is_ok());
        assert!(check_action("JUMP").is_ok());
        assert!(matches!(check_action("  "), Err(RequestError::BlankAction)));
    }

    #[test]
    fn reference_parsing() {
        assert!(parse_reference(&[]).unwrap().is_none());
        let r = parse_reference(&[0.5, -0.25]).unwrap().unwrap();
        assert_eq!(r.values, vec![0.5f32, -0.25]);
        assert!(matches!(
            parse_reference(&[1.0, f64::NAN]),
            Err(RequestError::InvalidReference(_))
        ));
        assert!(matches!(
            parse_reference(&[1e300]),
            Err(RequestError::InvalidReference(_))
        ));
    }

    #[test]
    fn maps_to_invalid_args() {
        let err: zbus::fdo::Error = RequestError::NoImages.into();
        assert!(matches!(err, zbus::fdo::Error::InvalidArgs(_)));
    }
}
