/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use entity::deployment::DeploymentStatus;
use shipyard_core::database::{get_latest_deployment, get_project_by_subdomain};
use shipyard_core::types::ServerState;
use tracing::debug;
use uuid::Uuid;

use crate::rewrite::rewrite_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No project owns the subdomain.
    NotFound,
    /// The project has no deployment yet, or its latest one is not `COMPLETED`.
    Unavailable,
    Upstream { deployment: Uuid, url: String },
}

/// Subdomain label of a `Host` value. With a platform domain, only direct
/// children of that domain have one.
pub fn extract_subdomain(host: &str, domain: Option<&str>) -> Option<String> {
    let host = host.trim();

    // IPv6 literals carry no subdomain
    if host.starts_with('[') {
        return None;
    }

    let host = host
        .split(':')
        .next()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_lowercase();

    let label = match domain {
        Some(domain) => {
            let domain = domain.trim().trim_end_matches('.').to_lowercase();
            let label = host.strip_suffix(&domain)?.strip_suffix('.')?;

            if label.contains('.') {
                return None;
            }

            label.to_string()
        }
        None => host.split('.').next().unwrap_or_default().to_string(),
    };

    if label.is_empty() {
        return None;
    }

    Some(label)
}

pub fn upstream_url(artifact_url: &str, deployment: Uuid, path: &str) -> String {
    format!(
        "{}/{}{}",
        artifact_url.trim_end_matches('/'),
        deployment,
        rewrite_path(path)
    )
}

/// Resolves a request for `path` on `host` to what should be served. Reads
/// only; resolving the same request twice gives the same answer as long as
/// no deployment changes in between.
pub async fn resolve(state: &ServerState, host: &str, path: &str) -> Result<Resolution> {
    let Some(subdomain) = extract_subdomain(host, state.cli.domain.as_deref()) else {
        return Ok(Resolution::NotFound);
    };

    let Some(project) = get_project_by_subdomain(&state.db, &subdomain).await? else {
        debug!(subdomain = %subdomain, "No project for subdomain");
        return Ok(Resolution::NotFound);
    };

    let deployment = match get_latest_deployment(&state.db, project.id).await? {
        Some(deployment) if deployment.status == DeploymentStatus::Completed => deployment,
        Some(deployment) => {
            debug!(
                deployment_id = %deployment.id,
                status = %deployment.status,
                "Latest deployment is not completed"
            );
            return Ok(Resolution::Unavailable);
        }
        None => return Ok(Resolution::Unavailable),
    };

    Ok(Resolution::Upstream {
        deployment: deployment.id,
        url: upstream_url(&state.cli.artifact_url, deployment.id, path),
    })
}
