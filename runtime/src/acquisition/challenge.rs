//! Anti-bot challenge pages served with a 2xx status.
//!
//! A blocked client often gets a 200 carrying an interstitial instead of the
//! content. Such pages must count as failures against the source, not successes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    Cloudflare,
    Recaptcha,
    Hcaptcha,
    DataDome,
    PerimeterX,
    Incapsula,
}

impl Challenge {
    pub fn as_str(self) -> &'static str {
        match self {
            Challenge::Cloudflare => "cloudflare",
            Challenge::Recaptcha => "recaptcha",
            Challenge::Hcaptcha => "hcaptcha",
            Challenge::DataDome => "datadome",
            Challenge::PerimeterX => "perimeterx",
            Challenge::Incapsula => "incapsula",
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase markers per vendor. A bare "cloudflare" or "akamai" also shows up
/// in footers of perfectly normal pages, so only challenge-specific markers count.
const MARKERS: &[(Challenge, &[&str])] = &[
    (
        Challenge::Cloudflare,
        &["cf-browser-verification", "cf-challenge", "challenges.cloudflare.com", "cf_chl_"],
    ),
    (Challenge::Recaptcha, &["g-recaptcha", "grecaptcha"]),
    (Challenge::Hcaptcha, &["h-captcha", "hcaptcha"]),
    (Challenge::DataDome, &["datadome", "captcha-delivery.com"]),
    (Challenge::PerimeterX, &["px-captcha", "perimeterx"]),
    (Challenge::Incapsula, &["incapsula", "_incap_"]),
];

/// First challenge vendor whose markers appear in `body`.
pub fn detect(body: &str) -> Option<Challenge> {
    let lower = body.to_lowercase();
    MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(challenge, _)| *challenge)
}
