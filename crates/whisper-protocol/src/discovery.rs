//! Discovery advertisement payload.
//!
//! The advertising side broadcasts `{"show": "Yes"|"No"}`; browsers only
//! surface peers that opted in with `"Yes"`.

use std::collections::BTreeMap;

/// Key/value pairs broadcast alongside a discovery advertisement.
pub type DiscoveryInfo = BTreeMap<String, String>;

/// Advertisement key carrying the visibility opt-in.
pub const SHOW_KEY: &str = "show";

pub const SHOW_YES: &str = "Yes";
pub const SHOW_NO: &str = "No";

/// Build the advertisement payload for the given opt-in flag.
pub fn advertisement(is_advertising: bool) -> DiscoveryInfo {
    let value = if is_advertising { SHOW_YES } else { SHOW_NO };
    let mut info = DiscoveryInfo::new();
    info.insert(SHOW_KEY.to_string(), value.to_string());
    info
}

/// Whether a discovered peer opted in to being shown.
pub fn is_visible(info: &DiscoveryInfo) -> bool {
    info.get(SHOW_KEY).map(String::as_str) == Some(SHOW_YES)
}
