//! `spot-harvest fingerprint`: show a freshly generated client identity.

use crate::cli::output::{self, Styled};
use crate::stealth::fingerprint;

pub fn run() {
    let fp = fingerprint::generate();
    if output::is_json() {
        output::print_json(&fp);
        return;
    }

    let s = Styled::new();
    let (w, h) = fp.resolution();
    output::print_section(&s, "Fingerprint");
    output::print_check(&s.info_sym(), "platform", &format!("{} ({:?})", fp.platform(), fp.device_class()));
    output::print_check(&s.info_sym(), "user agent", &s.cyan(fp.user_agent()));
    output::print_check(&s.info_sym(), "screen", &format!("{w}x{h} @ {}bit", fp.color_depth()));
    output::print_check(&s.info_sym(), "languages", &fp.accept_language());
    output::print_check(&s.info_sym(), "timezone", fp.timezone());
    output::print_check(
        &s.info_sym(),
        "webgl",
        &format!("{} / {}", fp.webgl_vendor(), fp.webgl_renderer()),
    );
    output::print_check(
        &s.info_sym(),
        "hardware",
        &format!(
            "{} cores, {} GB, {} touch points",
            fp.hardware_concurrency(),
            fp.device_memory_gb(),
            fp.max_touch_points()
        ),
    );
}
