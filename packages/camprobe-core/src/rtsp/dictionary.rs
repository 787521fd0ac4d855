//! Ordered probe dictionaries.
//!
//! Probing stops at the first success, so the cheapest hits for common
//! hardware come first. Both lists can be replaced through the `[rtsp]`
//! config table.

use crate::auth::Credential;

/// Stream paths, vendor conventions first and generic fallbacks last.
pub const DEFAULT_PATHS: &[&str] = &[
    // Generic Chinese firmware (V380, Anboqi and relatives)
    "/live/ch00_0",
    "/live/ch00_1",
    "/live/ch0",
    "/live/ch1",
    "/ch0_0.h264",
    "/ch0_1.h264",
    "/11",
    "/12",
    "/stream0",
    "/stream1",
    "/h264_stream",
    "/live0.264",
    "/live1.264",
    // ONVIF media inputs
    "/onvif1",
    "/onvif2",
    "/MediaInput/h264",
    "/MediaInput/mpeg4",
    "/ONVIF/MediaInput",
    // Generic
    "/",
    "/live",
    "/live.sdp",
    "/video",
    "/video1",
    "/h264",
    "/mpeg4",
    "/cam/realmonitor?channel=1&subtype=0",
    "/cam/realmonitor?channel=1&subtype=1",
    "/h264/ch1/main/av_stream",
    "/h264/ch1/sub/av_stream",
    "/Streaming/Channels/101",
    "/Streaming/Channels/102",
    // Hikvision
    "/ISAPI/Streaming/channels/101",
    // Dahua
    "/cam/realmonitor?channel=1&subtype=00",
    // Less common layouts
    "/videoMain",
    "/videoSub",
    "/1",
    "/1/stream1",
    "/ch1-s1",
    "/stream",
    "/media.amp",
    "/video.mp4",
    "/ipcam.sdp",
    "/mpeg4cif",
    "/1/cif",
    "/ucast/11",
    "/ROH/channel/11",
];

/// Factory-default logins, tried only once a path asks for authentication.
pub const DEFAULT_CREDENTIALS: &[(&str, &str)] = &[
    ("admin", "admin"),
    ("admin", ""),
    ("admin", "12345"),
    ("admin", "123456"),
    ("admin", "888888"),
    ("admin", "password"),
    ("root", "root"),
    ("user", "user"),
];

pub fn default_paths() -> Vec<String> {
    DEFAULT_PATHS.iter().map(|p| p.to_string()).collect()
}

pub fn default_credentials() -> Vec<Credential> {
    DEFAULT_CREDENTIALS
        .iter()
        .map(|(u, p)| Credential::new(*u, *p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_paths_are_unique_and_rooted() {
        let unique: HashSet<&str> = DEFAULT_PATHS.iter().copied().collect();
        assert_eq!(unique.len(), DEFAULT_PATHS.len());
        assert!(DEFAULT_PATHS.iter().all(|p| p.starts_with('/')));
        assert_eq!(DEFAULT_PATHS.first(), Some(&"/live/ch00_0"));
        assert_eq!(DEFAULT_PATHS.last(), Some(&"/ROH/channel/11"));
    }

    #[test]
    fn test_admin_admin_is_tried_first() {
        let creds = default_credentials();
        assert_eq!(creds[0], Credential::new("admin", "admin"));
    }
}
