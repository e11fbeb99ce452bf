/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod deployment;
pub mod job;
pub mod log_event;
pub mod project;
pub mod status_snapshot;
