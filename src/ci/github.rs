//! GitHub Actions log groups
//!
//! Lines between `::group::<title>` and `::endgroup::` are folded into a
//! collapsible section of the job log.

use std::future::Future;
use std::io::Write;

/// Whether we are running inside a GitHub Actions job.
pub fn in_github_actions() -> bool {
    std::env::var_os("GITHUB_ACTIONS").is_some_and(|v| v == "true")
}

pub fn group_start(title: &str) -> String {
    // Newlines would end the workflow command early
    format!("::group::{}", title.replace(['\r', '\n'], " "))
}

pub fn group_end() -> &'static str {
    "::endgroup::"
}

/// An open log group. Closing happens on drop, so a group whose work is
/// cancelled part way through is still closed.
pub struct LogGroup<W: Write> {
    out: W,
}

impl<W: Write> LogGroup<W> {
    pub fn open(title: &str, mut out: W) -> Self {
        let _ = writeln!(out, "{}", group_start(title));
        Self { out }
    }
}

impl<W: Write> Drop for LogGroup<W> {
    fn drop(&mut self) {
        let _ = writeln!(self.out, "{}", group_end());
        let _ = self.out.flush();
    }
}

/// Run `f` inside a log group on stdout when `enabled`, otherwise just run it.
pub async fn in_log_group<F, T>(title: &str, enabled: bool, f: F) -> T
where
    F: Future<Output = T>,
{
    if !enabled {
        return f.await;
    }
    in_log_group_to(title, std::io::stdout(), f).await
}

async fn in_log_group_to<W, F, T>(title: &str, out: W, f: F) -> T
where
    W: Write,
    F: Future<Output = T>,
{
    let _group = LogGroup::open(title, out);
    f.await
}
