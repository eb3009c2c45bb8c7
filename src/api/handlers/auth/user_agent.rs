//! User-agent classification into coarse browser/OS/device labels.
//!
//! These labels are display metadata on trusted-device records, nothing
//! more, so a small family match beats a full parser. Unrecognized input
//! degrades to `Unknown`/`Other`.

/// Parsed user-agent labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAgent {
    pub browser: String,
    pub os: String,
    pub device: String,
}

impl ClientAgent {
    fn unknown() -> Self {
        Self {
            browser: "Unknown".to_string(),
            os: "Unknown".to_string(),
            device: "Unknown".to_string(),
        }
    }
}

/// Classify a raw User-Agent header value.
#[must_use]
pub fn parse_user_agent(ua: &str) -> ClientAgent {
    let ua = ua.trim();
    if ua.is_empty() {
        return ClientAgent::unknown();
    }

    let browser = browser_family(ua);
    let os = os_family(ua);
    let device = device_type(ua, os);

    ClientAgent {
        browser: browser.to_string(),
        os: os.to_string(),
        device: device.to_string(),
    }
}

fn browser_family(ua: &str) -> &'static str {
    // Order matters: Chrome-derived agents also advertise "Chrome" and
    // "Safari".
    if ua.contains("Edg/") || ua.contains("Edge/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Chrome/") || ua.contains("CriOS/") {
        "Chrome"
    } else if ua.contains("Firefox/") || ua.contains("FxiOS/") {
        "Firefox"
    } else if ua.contains("Safari/") {
        "Safari"
    } else if ua.contains("MSIE") || ua.contains("Trident/") {
        "Internet Explorer"
    } else if ua.starts_with("curl/") {
        "curl"
    } else {
        "Unknown"
    }
}

fn os_family(ua: &str) -> &'static str {
    if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        "iOS"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        "Mac OS X"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

fn device_type(ua: &str, os: &'static str) -> &'static str {
    let lowered = ua.to_lowercase();
    if lowered.contains("bot") || lowered.contains("spider") || lowered.contains("crawl") {
        return "Bot";
    }
    if ua.contains("iPad") || (os == "Android" && !ua.contains("Mobile")) {
        return "Tablet";
    }
    if ua.contains("iPhone") || ua.contains("Mobi") {
        return "Mobile";
    }
    match os {
        "Windows" | "Mac OS X" | "Linux" => "PC",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:115.0) Gecko/20100101 Firefox/115.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X906C) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn classifies_desktop_browsers() {
        let agent = parse_user_agent(CHROME_WINDOWS);
        assert_eq!(agent.browser, "Chrome");
        assert_eq!(agent.os, "Windows");
        assert_eq!(agent.device, "PC");

        let agent = parse_user_agent(FIREFOX_LINUX);
        assert_eq!(agent.browser, "Firefox");
        assert_eq!(agent.os, "Linux");
        assert_eq!(agent.device, "PC");
    }

    #[test]
    fn edge_is_not_reported_as_chrome() {
        let agent = parse_user_agent(EDGE_WINDOWS);
        assert_eq!(agent.browser, "Edge");
    }

    #[test]
    fn classifies_mobile_and_tablet() {
        let agent = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(agent.browser, "Safari");
        assert_eq!(agent.os, "iOS");
        assert_eq!(agent.device, "Mobile");

        let agent = parse_user_agent(ANDROID_TABLET);
        assert_eq!(agent.os, "Android");
        assert_eq!(agent.device, "Tablet");
    }

    #[test]
    fn classifies_bots() {
        let agent = parse_user_agent(GOOGLEBOT);
        assert_eq!(agent.device, "Bot");
    }

    #[test]
    fn empty_input_is_unknown() {
        let agent = parse_user_agent("");
        assert_eq!(agent.browser, "Unknown");
        assert_eq!(agent.os, "Unknown");
        assert_eq!(agent.device, "Unknown");
    }
}
