/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::response::{Html, IntoResponse, Response};
use http::{StatusCode, header};

pub const RETRY_AFTER_SECONDS: &str = "10";

const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Site not found</title></head>
<body>
<h1>Site not found</h1>
<p>There is no site deployed at this address.</p>
</body>
</html>
"#;

const UNAVAILABLE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><meta http-equiv="refresh" content="10"><title>Deployment in progress</title></head>
<body>
<h1>This site is not available yet</h1>
<p>The latest deployment has not finished successfully. This page reloads automatically.</p>
</body>
</html>
"#;

const BAD_GATEWAY_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Bad gateway</title></head>
<body>
<h1>Bad gateway</h1>
<p>The site content could not be loaded.</p>
</body>
</html>
"#;

const INTERNAL_ERROR_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Internal error</title></head>
<body>
<h1>Internal error</h1>
</body>
</html>
"#;

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response()
}

pub fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, RETRY_AFTER_SECONDS)],
        Html(UNAVAILABLE_PAGE),
    )
        .into_response()
}

pub fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, Html(BAD_GATEWAY_PAGE)).into_response()
}

pub fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Html(INTERNAL_ERROR_PAGE)).into_response()
}
