use regex::Regex;
use std::sync::LazyLock;

static TRACK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://open\.spotify\.com/track/(?P<id>[A-Za-z0-9]+)(?:\?si=[A-Za-z0-9_-]+)?(?:&nd=1)?",
    )
    .expect("track URL pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackUrl<'a> {
    pub url: &'a str,
    pub id: &'a str,
}

/// First Spotify track link in `text`, if any. Albums and playlists do not
/// count.
pub fn find_track_url(text: &str) -> Option<TrackUrl<'_>> {
    let captures = TRACK_URL.captures(text)?;
    Some(TrackUrl {
        url: captures.get(0)?.as_str(),
        id: captures.name("id")?.as_str(),
    })
}

pub fn is_track_url(text: &str) -> bool {
    find_track_url(text).is_some()
}
