//! Human-readable run summaries.

use crate::cli::output::{self, Styled};
use crate::pipeline::RunSummary;

pub fn print_summary(s: &Styled, summary: &RunSummary) {
    output::print_section(s, &format!("Run {}", summary.run_id));
    output::print_check(&s.info_sym(), "source", &summary.source_key);
    if summary.requests > 0 {
        let sym = if summary.fetched == summary.requests {
            s.ok_sym()
        } else {
            s.warn_sym()
        };
        output::print_check(&sym, "fetched", &format!("{}/{}", summary.fetched, summary.requests));
    }
    output::print_check(&s.info_sym(), "posts", &summary.posts.to_string());
    output::print_check(&s.ok_sym(), "stored", &s.green(&summary.stored.to_string()));
    output::print_check(&s.info_sym(), "duplicates", &summary.duplicates.to_string());
    if summary.rejected > 0 {
        output::print_check(&s.fail_sym(), "rejected", &s.red(&summary.rejected.to_string()));
        for (kind, n) in &summary.rejections {
            output::print_detail(&s.dim(&format!("{kind}: {n}")));
        }
    }
    if output::is_verbose() {
        for (class, n) in &summary.errors {
            output::print_check(&s.dim("·"), &format!("{class:?}"), &n.to_string());
        }
    }

    let elapsed = summary
        .elapsed_ms()
        .map(|ms| output::format_duration((ms / 1000).max(0) as u64))
        .unwrap_or_else(|| "-".into());
    let status = if summary.cancelled {
        s.yellow("cancelled")
    } else {
        s.green("done")
    };
    output::print_status(s, &status, &elapsed);
}
