//! Rollback script generation.
//!
//! A line-for-line port of `_generate_rollback_command` in
//! `original_source/src/loom-release-tg-bot/internal/service/release/service.py`:
//! announce the rollback to Event Intake, re-fetch and switch the
//! service's git tag, prune stale branches, reload the environment
//! files and rebuild the container, then poll its health endpoint
//! with a settle delay and bounded retries, reporting success or
//! failure back to Event Intake and tailing the container's logs on
//! failure.

/// Everything the script template needs that isn't already on the
/// `RollbackRequest` (see `executor.rs`): the production layout
/// assumptions the original bot hard-codes per-service.
#[derive(Debug, Clone)]
pub struct ServiceTopology {
    /// HTTP port the service's health endpoint listens on.
    pub port: u16,
    /// URL path prefix in front of `/health` (the original derives
    /// this from the service name with its `loom-` prefix stripped;
    /// we take it as a config value instead of hard-coding the
    /// prefix convention).
    pub health_path_prefix: String,
}

pub fn generate_rollback_script(
    event_intake_base_url: &str,
    release_id: i64,
    service_name: &str,
    target_tag: &str,
    topology: &ServiceTopology,
) -> String {
    let port = topology.port;
    let prefix = &topology.health_path_prefix;

    format!(
        r#"#!/bin/bash
# Rollback {service_name} to {target_tag}
curl -s -X PATCH \
  -H "Content-Type: application/json" \
  -d '{{"release_id": {release_id}, "status": "rollback"}}' \
  "{event_intake_base_url}/release"

set -e

mkdir -p /var/log/deployments/rollback/{service_name}
LOG_FILE="/var/log/deployments/rollback/{service_name}/{target_tag}-rollback.log"

log_message() {{
    local message="$1"
    echo "$(date '+%Y-%m-%d %H:%M:%S') - $message" | tee -a "$LOG_FILE"
}}

log_message "starting rollback of {service_name} to {target_tag}"

cd loom/{service_name}

CURRENT_REF=$(git symbolic-ref --short HEAD 2>/dev/null || git describe --tags --exact-match 2>/dev/null || git rev-parse --short HEAD)
log_message "current state before rollback: $CURRENT_REF"

if git tag -l | grep -q "^{target_tag}$"; then
    log_message "local tag {target_tag} already exists, removing it to refresh"
    git tag -d {target_tag} 2>&1 | tee -a "$LOG_FILE"
fi

log_message "fetching updates from origin"
git fetch origin 2>&1 | tee -a "$LOG_FILE"

log_message "force-fetching tags"
git fetch origin --tags --force 2>&1 | tee -a "$LOG_FILE"

if ! git tag -l | grep -q "^{target_tag}$"; then
    log_message "tag {target_tag} not found in repository after fetch"
    log_message "available tags:"
    git tag -l | tail -10 | tee -a "$LOG_FILE"
    exit 1
fi

log_message "tag {target_tag} found, checking it out"
git checkout {target_tag} 2>&1 | tee -a "$LOG_FILE"

log_message "pruning stale local branches"
git for-each-ref --format='%(refname:short)' refs/heads | grep -v -E "^(main|master)$" | xargs -r git branch -D 2>&1 | tee -a "$LOG_FILE"

log_message "pruning stale remote-tracking branches"
git remote prune origin 2>&1 | tee -a "$LOG_FILE"

log_message "checkout of {target_tag} complete"

cd ../loom-system

export $(cat env/.env.app env/.env.db env/.env.monitoring | xargs)

log_message "rebuilding container for rollback to {target_tag}"
docker compose -f ./docker-compose/app.yaml up -d --build {service_name} 2>&1 | tee -a "$LOG_FILE"

log_message "images present after rollback:"
docker images | grep {service_name} | tee -a "$LOG_FILE"

check_health() {{
    if curl -f -s -o /dev/null -w "%{{http_code}}" http://localhost:{port}{prefix}/health | grep -q "200"; then
        return 0
    else
        return 1
    fi
}}

MAX_ATTEMPTS=5
ATTEMPT=1
SUCCESS=false

log_message "waiting for the service to come up after rollback"
sleep 15

while [ $ATTEMPT -le $MAX_ATTEMPTS ]; do
    log_message "health check after rollback (attempt $ATTEMPT of $MAX_ATTEMPTS)"

    if check_health; then
        log_message "health check passed after rollback"
        SUCCESS=true
        break
    else
        log_message "health check failed, waiting before retry"
        sleep 20
    fi

    ATTEMPT=$((ATTEMPT + 1))
done

if [ "$SUCCESS" = false ]; then
    log_message "health check failed after $MAX_ATTEMPTS attempts"
    log_message "container logs:"
    docker logs --tail 100 {service_name} 2>&1 | tee -a "$LOG_FILE"
    curl -s -X PATCH \
      -H "Content-Type: application/json" \
      -d '{{"release_id": {release_id}, "status": "rollback_failed"}}' \
      "{event_intake_base_url}/release"
    exit 1
fi

curl -s -X PATCH \
  -H "Content-Type: application/json" \
  -d '{{"release_id": {release_id}, "status": "rollback_done"}}' \
  "{event_intake_base_url}/release"

log_message "rollback to {target_tag} finished successfully"
log_message "service: {service_name}"
log_message "version: {target_tag}"
log_message "status: rolled back successfully"
log_message "rollback log saved at: $LOG_FILE"

echo "tail of the rollback log:"
tail -20 "$LOG_FILE"
"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> ServiceTopology {
        ServiceTopology {
            port: 8080,
            health_path_prefix: "/api/checkout".to_string(),
        }
    }

    #[test]
    fn script_embeds_the_target_tag_and_service_name() {
        let script = generate_rollback_script(
            "http://intake.internal",
            42,
            "loom-checkout",
            "v1.2.3",
            &topology(),
        );
        assert!(script.contains("loom-checkout"));
        assert!(script.contains("v1.2.3"));
        assert!(script.contains("\"release_id\": 42"));
    }

    #[test]
    fn script_announces_rollback_start_and_both_terminal_outcomes() {
        let script = generate_rollback_script(
            "http://intake.internal",
            1,
            "loom-checkout",
            "v1.0.0",
            &topology(),
        );
        assert!(script.contains(r#""status": "rollback""#));
        assert!(script.contains(r#""status": "rollback_failed""#));
        assert!(script.contains(r#""status": "rollback_done""#));
    }

    #[test]
    fn script_probes_health_on_the_configured_port_and_prefix() {
        let script = generate_rollback_script(
            "http://intake.internal",
            1,
            "loom-checkout",
            "v1.0.0",
            &topology(),
        );
        assert!(script.contains("http://localhost:8080/api/checkout/health"));
    }
}
