//! Resolution of `mxc://` media URIs to HTTP thumbnail URLs.

use crate::constants::AVATAR_THUMBNAIL_PX;

/// Convert an `mxc://server/mediaId` URI to an HTTP thumbnail URL served
/// by the homeserver's media endpoint.
///
/// Returns `None` for anything that is not a well-formed `mxc://` URI, so
/// a missing or garbage avatar degrades to "no avatar" rather than a
/// broken image.
pub fn mxc_to_http(
    mxc_uri: Option<&str>,
    homeserver_url: &str,
    width: u32,
    height: u32,
) -> Option<String> {
    let rest = mxc_uri?.strip_prefix("mxc://")?;
    let (server_name, media_id) = rest.split_once('/')?;
    if server_name.is_empty() || media_id.is_empty() {
        return None;
    }
    Some(format!(
        "{homeserver_url}/_matrix/media/v3/thumbnail/{server_name}/{media_id}?width={width}&height={height}&method=crop"
    ))
}

/// [`mxc_to_http`] at the standard avatar thumbnail size.
pub fn avatar_url(mxc_uri: Option<&str>, homeserver_url: &str) -> Option<String> {
    mxc_to_http(
        mxc_uri,
        homeserver_url,
        AVATAR_THUMBNAIL_PX,
        AVATAR_THUMBNAIL_PX,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_mxc_uri() {
        let url = mxc_to_http(Some("mxc://hs.example/abc123"), "https://hs.example", 40, 40);
        assert_eq!(
            url.as_deref(),
            Some(
                "https://hs.example/_matrix/media/v3/thumbnail/hs.example/abc123?width=40&height=40&method=crop"
            )
        );
    }

    #[test]
    fn rejects_non_mxc() {
        assert_eq!(mxc_to_http(Some("https://x/y"), "https://hs", 40, 40), None);
        assert_eq!(mxc_to_http(None, "https://hs", 40, 40), None);
    }

    #[test]
    fn rejects_malformed_mxc() {
        assert_eq!(mxc_to_http(Some("mxc://noslash"), "https://hs", 40, 40), None);
        assert_eq!(mxc_to_http(Some("mxc:///media"), "https://hs", 40, 40), None);
        assert_eq!(mxc_to_http(Some("mxc://server/"), "https://hs", 40, 40), None);
    }
}
