//! Favorite song entries and extraction from the favorites page HTML.

use reqwest::Url;
use scraper::{Html, Selector};

/// Song links on the favorites page carry a `data-song` attribute.
const SONG_SELECTOR: &str = "a[data-song]";

/// One favorited song.  Identity is `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteEntry {
    /// Destination URL, resolved against the favorites page URL when relative.
    /// Left as written when it cannot be resolved; selection rejects it later.
    pub href: String,
    pub song_id: Option<String>,
    pub title: String,
}

impl FavoriteEntry {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            song_id: None,
            title: String::new(),
        }
    }
}

/// Extract every song link from `html`, in document order.
pub fn parse_favorites(html: &str, base: &Url) -> Vec<FavoriteEntry> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(SONG_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| {
            let raw = element.value().attr("href").unwrap_or_default().trim();
            let href = if raw.is_empty() {
                String::new()
            } else {
                base.join(raw)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| raw.to_string())
            };
            FavoriteEntry {
                href,
                song_id: element.value().attr("data-song").map(str::to_string),
                title: element
                    .text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            }
        })
        .collect()
}
