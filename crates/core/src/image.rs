//! CDN image URL building.
//!
//! The ERP stores product images as paths relative to a media CDN. Size
//! presets map to the CDN's `w` resize parameter.

/// Image size presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    /// Cart and suggestion thumbnails.
    Thumb,
    /// Listing cards.
    Card,
    /// Original upload, no resize.
    Full,
}

impl ImageSize {
    /// Target width in pixels, `None` for the original.
    #[must_use]
    pub const fn width(&self) -> Option<u32> {
        match self {
            Self::Thumb => Some(160),
            Self::Card => Some(480),
            Self::Full => None,
        }
    }
}

/// Build an image URL from a CDN base and an ERP image path.
///
/// Absolute `http(s)://` URLs are returned unchanged. Missing or blank paths
/// yield `None` so callers can fall back to a placeholder.
///
/// ```
/// use depot_core::{ImageSize, image_url};
///
/// assert_eq!(
///     image_url("https://cdn.example.com/", Some("/media/a.jpg"), ImageSize::Thumb).as_deref(),
///     Some("https://cdn.example.com/media/a.jpg?w=160"),
/// );
/// assert_eq!(image_url("https://cdn.example.com", Some("  "), ImageSize::Card), None);
/// ```
#[must_use]
pub fn image_url(base: &str, path: Option<&str>, size: ImageSize) -> Option<String> {
    let path = path.map(str::trim).filter(|p| !p.is_empty())?;

    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }

    let url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    Some(match size.width() {
        Some(width) if url.contains('?') => format!("{url}&w={width}"),
        Some(width) => format!("{url}?w={width}"),
        None => url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url_passes_through() {
        assert_eq!(
            image_url("https://cdn.example.com", Some("https://other.example/x.png"), ImageSize::Thumb)
                .as_deref(),
            Some("https://other.example/x.png")
        );
    }

    #[test]
    fn test_full_size_has_no_resize() {
        assert_eq!(
            image_url("https://cdn.example.com", Some("media/x.png"), ImageSize::Full).as_deref(),
            Some("https://cdn.example.com/media/x.png")
        );
    }

    #[test]
    fn test_existing_query_string_is_extended() {
        assert_eq!(
            image_url("https://cdn.example.com", Some("img?id=7"), ImageSize::Card).as_deref(),
            Some("https://cdn.example.com/img?id=7&w=480")
        );
    }

    #[test]
    fn test_missing_path() {
        assert_eq!(image_url("https://cdn.example.com", None, ImageSize::Card), None);
    }
}
