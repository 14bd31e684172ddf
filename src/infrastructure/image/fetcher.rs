//! Network fetch with size-bounded decoding.
//!
//! The body is fetched once, its header is probed for the intrinsic
//! dimensions, and the full decode is reduced by a power-of-two factor
//! chosen so the result still covers the target size.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageReader, imageops::FilterType};
use tracing::{debug, trace};

use crate::domain::entities::{CachedImage, TargetSize};
use crate::domain::errors::ImageError;
use crate::domain::ports::ImageTransport;

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Decoded, downsampled image.
    pub image: CachedImage,
    /// Intrinsic size of the source.
    pub source_size: TargetSize,
    /// Factor applied to both dimensions.
    pub factor: u32,
}

/// Largest power-of-two factor that keeps the decoded image at least as
/// large as `target` in both dimensions.
///
/// Zero target dimensions are treated as one pixel.
#[must_use]
pub fn downsample_factor(source: TargetSize, target: TargetSize) -> u32 {
    let target_width = target.width.max(1);
    let target_height = target.height.max(1);
    let half_width = source.width / 2;
    let half_height = source.height / 2;

    let mut factor = 1u32;
    while half_height / factor >= target_height && half_width / factor >= target_width {
        factor *= 2;
    }
    factor
}

/// Reads only the image header and returns its dimensions.
///
/// # Errors
/// Returns [`ImageError::Decode`] for unrecognised data or zero dimensions.
pub fn probe_dimensions(bytes: &[u8]) -> Result<TargetSize, ImageError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::decode(format!("Failed to detect format: {e}")))?
        .into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(ImageError::decode(format!(
            "Image has zero dimensions ({width}x{height})"
        )));
    }
    Ok(TargetSize::new(width, height))
}

/// Decodes `bytes` and reduces both dimensions by `factor`.
///
/// # Errors
/// Returns [`ImageError::Decode`] if the data cannot be decoded.
pub fn decode_sampled(bytes: &[u8], factor: u32) -> Result<DynamicImage, ImageError> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::decode(format!("Failed to detect format: {e}")))?
        .decode()?;

    if factor <= 1 {
        return Ok(decoded);
    }
    let width = (decoded.width() / factor).max(1);
    let height = (decoded.height() / factor).max(1);
    Ok(decoded.resize_exact(width, height, FilterType::Triangle))
}

/// Probes, picks the factor and decodes in one pass over `bytes`.
///
/// # Errors
/// Returns [`ImageError::Decode`] for malformed data or zero dimensions.
pub fn decode_for_target(bytes: &[u8], target: TargetSize) -> Result<FetchedImage, ImageError> {
    let source_size = probe_dimensions(bytes)?;
    let factor = downsample_factor(source_size, target);
    trace!(source = %source_size, target = %target, factor, "Computed downsample factor");
    let image = decode_sampled(bytes, factor)?;
    Ok(FetchedImage {
        image: CachedImage::new(image),
        source_size,
        factor,
    })
}

/// Decodes an image stored by the disk tier.
///
/// # Errors
/// Returns [`ImageError::Decode`] if the data cannot be decoded.
pub fn decode_cached(bytes: &[u8]) -> Result<CachedImage, ImageError> {
    probe_dimensions(bytes)?;
    Ok(CachedImage::new(decode_sampled(bytes, 1)?))
}

/// Encodes an image losslessly for the disk tier.
///
/// # Errors
/// Returns [`ImageError::CacheWrite`] if encoding fails.
pub fn encode_for_disk(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ImageError::cache_write(format!("Failed to encode image: {e}")))?;
    Ok(out.into_inner())
}

/// Fetches images through a transport and decodes them off the async
/// worker threads.
#[derive(Clone)]
pub struct ImageFetcher {
    transport: Arc<dyn ImageTransport>,
}

impl ImageFetcher {
    /// Creates a fetcher over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn ImageTransport>) -> Self {
        Self { transport }
    }

    /// Downloads `url` and decodes it for `target`.
    ///
    /// The response body is owned by this call and dropped on every path,
    /// so the connection is released whether decoding succeeds or not.
    ///
    /// # Errors
    /// Returns [`ImageError::Network`] or [`ImageError::Decode`].
    pub async fn fetch(&self, url: &str, target: TargetSize) -> Result<FetchedImage, ImageError> {
        let body: Bytes = self.transport.open(url).await?;
        debug!(url = %url, size = body.len(), "Downloaded image body");

        let fetched = tokio::task::spawn_blocking(move || decode_for_target(&body, target))
            .await
            .map_err(|e| ImageError::decode(format!("Decode task panicked: {e}")))??;

        debug!(
            url = %url,
            source = %fetched.source_size,
            factor = fetched.factor,
            width = fetched.image.width(),
            height = fetched.image.height(),
            "Decoded image"
        );
        Ok(fetched)
    }
}

impl std::fmt::Debug for ImageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFetcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::ports::MockImageTransport;
    use crate::domain::ports::mocks::{ScriptedTransport, png_bytes};
    use test_case::test_case;

    #[test_case(800, 800, 100, 100, 8 ; "square_source_eighth")]
    #[test_case(100, 100, 200, 200, 1 ; "upscale_request")]
    #[test_case(100, 100, 100, 100, 1 ; "exact_fit")]
    #[test_case(1000, 500, 100, 100, 4 ; "limited_by_height")]
    #[test_case(4000, 3000, 400, 300, 8 ; "camera_photo")]
    #[test_case(799, 799, 100, 100, 4 ; "just_below_power")]
    #[test_case(800, 800, 0, 0, 512 ; "zero_target_clamped")]
    fn test_downsample_factor(sw: u32, sh: u32, tw: u32, th: u32, expected: u32) {
        let factor = downsample_factor(TargetSize::new(sw, sh), TargetSize::new(tw, th));
        assert_eq!(factor, expected);
    }

    #[test]
    fn test_decode_for_target_800_to_100() {
        let bytes = png_bytes(800, 800);
        let fetched = decode_for_target(&bytes, TargetSize::new(100, 100)).unwrap();

        assert_eq!(fetched.factor, 8);
        assert_eq!(fetched.source_size, TargetSize::new(800, 800));
        assert_eq!(fetched.image.width(), 100);
        assert_eq!(fetched.image.height(), 100);
    }

    #[test]
    fn test_decode_for_target_no_upscale() {
        let bytes = png_bytes(100, 100);
        let fetched = decode_for_target(&bytes, TargetSize::new(200, 200)).unwrap();

        assert_eq!(fetched.factor, 1);
        assert_eq!(fetched.image.width(), 100);
    }

    #[test]
    fn test_probe_dimensions() {
        let bytes = png_bytes(37, 21);
        assert_eq!(probe_dimensions(&bytes).unwrap(), TargetSize::new(37, 21));
    }

    #[test]
    fn test_malformed_bytes_are_decode_error() {
        let err =
            decode_for_target(b"definitely not an image", TargetSize::new(10, 10)).unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let bytes = png_bytes(64, 64);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode_for_target(truncated, TargetSize::new(8, 8)).is_err());
    }

    #[test]
    fn test_encode_then_decode_cached() {
        let img = DynamicImage::new_rgba8(12, 7);
        let encoded = encode_for_disk(&img).unwrap();
        let decoded = decode_cached(&encoded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let transport =
            ScriptedTransport::new().serve_png("https://img/a.png", 400, 200, Duration::ZERO);
        let fetcher = ImageFetcher::new(Arc::new(transport));

        let fetched = fetcher
            .fetch("https://img/a.png", TargetSize::new(50, 50))
            .await
            .unwrap();
        assert_eq!(fetched.factor, 4);
        assert_eq!((fetched.image.width(), fetched.image.height()), (100, 50));
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        let mut transport = MockImageTransport::new();
        transport
            .expect_open()
            .times(1)
            .returning(|_| Err(ImageError::network("connection refused")));
        let fetcher = ImageFetcher::new(Arc::new(transport));

        let err = fetcher
            .fetch("https://img/down.png", TargetSize::new(10, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Network { .. }));
    }

    #[tokio::test]
    async fn test_fetch_decode_error() {
        let mut transport = MockImageTransport::new();
        transport
            .expect_open()
            .returning(|_| Ok(Bytes::from_static(b"<html>not found</html>")));
        let fetcher = ImageFetcher::new(Arc::new(transport));

        let err = fetcher
            .fetch("https://img/html", TargetSize::new(10, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
    }
}
