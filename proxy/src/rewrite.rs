/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub const INDEX_FILE: &str = "index.html";

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Maps a request path onto a file of the build output.
///
/// Directories and extensionless paths fall back to the `index.html` of
/// their directory, so client side routes like `/about` load the app:
///
/// - `/` and `/docs/` become `/index.html` and `/docs/index.html`
/// - `/docs/intro` becomes `/docs/index.html`
/// - `/app.js` stays `/app.js`
///
/// Dot segments are dropped and never leave the deployment root.
pub fn rewrite_path(path: &str) -> String {
    let mut segments = path
        .split('/')
        .filter(|s| !s.is_empty() && !is_dot_segment(s))
        .collect::<Vec<&str>>();

    let directory = path.is_empty() || path.ends_with('/');

    match segments.last() {
        Some(last) if !directory && last.contains('.') => {}
        Some(_) if !directory => {
            segments.pop();
            segments.push(INDEX_FILE);
        }
        _ => segments.push(INDEX_FILE),
    }

    format!("/{}", segments.join("/"))
}
