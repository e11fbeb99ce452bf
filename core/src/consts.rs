/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::ops::RangeInclusive;
use std::time::Duration;

pub const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

/// Prefix of every `failed` log event text.
pub const ERROR_MARKER: &str = "error:";

pub const BUILD_STARTED: &str = "build started";
pub const BUILD_COMPLETED: &str = "build completed";

/// Source trees live next to the build outputs in the artifact store. The
/// leading underscore keeps them apart from `<deployment id>/...` keys and
/// lets the artifact origin refuse to serve them.
pub const SOURCE_PREFIX: &str = "_sources";

pub const LOG_CHANNEL_PREFIX: &str = "logs:";
pub const LOG_CHANNEL_CAPACITY: usize = 1024;

pub const DEFAULT_LOG_PAGE_SIZE: u64 = 100;
pub const MAX_LOG_PAGE_SIZE: u64 = 1000;

pub const SUBDOMAIN_ALPHABET: &[u8] = b"1234567890qwertyuiopasdfghjklzxcvbnm";
pub const SUBDOMAIN_LENGTH: usize = 8;
pub const SUBDOMAIN_MAX_LENGTH: usize = 63;

/// Directories never uploaded from a cloned repository.
pub const IGNORED_SOURCE_DIRS: [&str; 1] = [".git"];

pub const STAGE_UPLOADED: &str = "uploaded";
pub const STAGE_BUILDING: &str = "building";
pub const STAGE_DEPLOYED: &str = "deployed";
pub const STAGE_FAILED: &str = "failed";

pub const WORKER_ERROR_BACKOFF: Duration = Duration::from_secs(5);
