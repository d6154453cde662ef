//! Execution unit naming and rendering
//!
//! Unit names are derived from the request alone, so asking twice for the
//! same database (and revision) always targets the same object. That is what
//! makes creation idempotent against the API server's name uniqueness.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use crate::delegation::{BackupRequest, RestoreRequest};

use super::engine::EngineProfile;
use super::env;

/// CronJob names longer than this cannot be scheduled
pub const MAX_UNIT_NAME_LEN: usize = 52;

const RETENTION_SUFFIX: &str = "-retention";

const MANAGED_BY: &str = "db-backup-operator";

/// Lowercase DNS-1123 label of at most [`MAX_UNIT_NAME_LEN`] characters
pub fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars().map(|c| c.to_ascii_lowercase()) {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && (name.is_empty() || name.ends_with('-')) {
            continue;
        }
        name.push(c);
    }
    truncate(&name, MAX_UNIT_NAME_LEN)
}

fn truncate(name: &str, max: usize) -> String {
    let cut = if name.len() > max { &name[..max] } else { name };
    cut.trim_end_matches('-').to_string()
}

pub fn backup_unit_name(profile: &EngineProfile, db_name: &str) -> String {
    sanitize_name(&format!("backup-{}-{}", profile.engine.short(), db_name))
}

pub fn restore_unit_name(profile: &EngineProfile, db_name: &str, revision: &str) -> String {
    sanitize_name(&format!(
        "restore-{}-{}-{}",
        profile.engine.short(),
        db_name,
        revision
    ))
}

/// Name of the retention companion of a backup unit
pub fn retention_unit_name(backup_unit: &str) -> String {
    let base = truncate(backup_unit, MAX_UNIT_NAME_LEN - RETENTION_SUFFIX.len());
    format!("{}{}", base, RETENTION_SUFFIX)
}

fn labels(profile: &EngineProfile, component: &str, db_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string()),
        ("app.kubernetes.io/component".to_string(), component.to_string()),
        ("backup.oiler.dev/engine".to_string(), profile.engine.tag().to_string()),
        ("backup.oiler.dev/database".to_string(), sanitize_name(db_name)),
    ])
}

fn metadata(name: String, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

fn pod_template(
    container: &str,
    image: &str,
    env: Vec<EnvVar>,
    restart_policy: &str,
    labels: BTreeMap<String, String>,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: container.to_string(),
                image: Some(image.to_string()),
                env: Some(env),
                ..Default::default()
            }],
            restart_policy: Some(restart_policy.to_string()),
            ..Default::default()
        }),
    }
}

fn scheduled(
    meta: ObjectMeta,
    schedule: &str,
    template: PodTemplateSpec,
) -> CronJob {
    CronJob {
        metadata: meta,
        spec: Some(CronJobSpec {
            schedule: schedule.to_string(),
            concurrency_policy: Some("Forbid".to_string()),
            successful_jobs_history_limit: Some(3),
            failed_jobs_history_limit: Some(1),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    backoff_limit: Some(2),
                    template,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Scheduled backup unit for `req`
pub fn backup_cron_job(profile: &EngineProfile, namespace: &str, req: &BackupRequest) -> CronJob {
    let labels = labels(profile, "backuper", &req.db_name);
    let template = pod_template(
        "backuper",
        &profile.backuper_image,
        env::backup_env(req),
        "OnFailure",
        labels.clone(),
    );
    scheduled(
        metadata(backup_unit_name(profile, &req.db_name), namespace, labels),
        &req.schedule,
        template,
    )
}

/// Retention companion of the backup unit `backup_unit`, owned by it
pub fn retention_cron_job(
    profile: &EngineProfile,
    backup_unit: &str,
    namespace: &str,
    req: &BackupRequest,
    owner: OwnerReference,
) -> CronJob {
    let labels = labels(profile, "retention", &req.db_name);
    let template = pod_template(
        "retention",
        &profile.retention_image,
        env::retention_env(req),
        "OnFailure",
        labels.clone(),
    );
    let mut meta = metadata(retention_unit_name(backup_unit), namespace, labels);
    meta.owner_references = Some(vec![owner]);
    scheduled(meta, &req.schedule, template)
}

/// One-shot restore unit for `req`
pub fn restore_job(profile: &EngineProfile, namespace: &str, req: &RestoreRequest) -> Job {
    let labels = labels(profile, "restorer", &req.db_name);
    let template = pod_template(
        "restorer",
        &profile.restorer_image,
        env::restore_env(req),
        "Never",
        labels.clone(),
    );
    Job {
        metadata: metadata(
            restore_unit_name(profile, &req.db_name, &req.revision),
            namespace,
            labels,
        ),
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template,
            ..Default::default()
        }),
        status: None,
    }
}

/// Re-render schedule, image and environment of an existing scheduled unit,
/// taking them from `rendered`. Identity, owner references and everything
/// else on `existing` are left alone.
pub fn apply_rendered(existing: &mut CronJob, rendered: &CronJob) {
    let (Some(spec), Some(fresh)) = (existing.spec.as_mut(), rendered.spec.as_ref()) else {
        existing.spec = rendered.spec.clone();
        return;
    };
    spec.schedule = fresh.schedule.clone();

    let fresh_container = fresh
        .job_template
        .spec
        .as_ref()
        .and_then(|job| job.template.spec.as_ref())
        .and_then(|pod| pod.containers.first());
    let container = spec
        .job_template
        .spec
        .as_mut()
        .and_then(|job| job.template.spec.as_mut())
        .and_then(|pod| pod.containers.first_mut());

    match (container, fresh_container) {
        (Some(container), Some(fresh_container)) => {
            container.image = fresh_container.image.clone();
            container.env = fresh_container.env.clone();
        }
        _ => spec.job_template = fresh.job_template.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::EngineKind;

    fn request(db_name: &str) -> BackupRequest {
        BackupRequest {
            db_uri: "pg".to_string(),
            db_port: 5432,
            db_user: "u".to_string(),
            db_pass: "p".to_string(),
            db_name: db_name.to_string(),
            engine_type: "postgres".to_string(),
            schedule: "0 0 * * *".to_string(),
            storage_class: String::new(),
            s3_endpoint: "http://minio:9000".to_string(),
            s3_access_key: "a".to_string(),
            s3_secret_key: "s".to_string(),
            s3_bucket: "b".to_string(),
            core_callback_addr: String::new(),
            max_backup_count: 3,
        }
    }

    #[test]
    fn backup_names_are_deterministic() {
        let profile = EngineProfile::new(EngineKind::Postgres);
        assert_eq!(backup_unit_name(&profile, "db1"), "backup-pg-db1");
        assert_eq!(backup_unit_name(&profile, "db1"), backup_unit_name(&profile, "db1"));
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("Backup-PG-My_DB.prod"), "backup-pg-my-db-prod");
        assert_eq!(sanitize_name("restore--pg--db/"), "restore-pg-db");

        let long = sanitize_name(&format!("backup-pg-{}", "x".repeat(80)));
        assert_eq!(long.len(), MAX_UNIT_NAME_LEN);
    }

    #[test]
    fn restore_name_includes_revision() {
        let profile = EngineProfile::new(EngineKind::MySql);
        assert_eq!(restore_unit_name(&profile, "shop", "2"), "restore-mysql-shop-2");
    }

    #[test]
    fn retention_name_fits_limit() {
        let backup = "b".repeat(MAX_UNIT_NAME_LEN);
        let name = retention_unit_name(&backup);
        assert!(name.len() <= MAX_UNIT_NAME_LEN);
        assert!(name.ends_with("-retention"));
        assert_eq!(retention_unit_name("backup-pg-db1"), "backup-pg-db1-retention");
    }

    #[test]
    fn backup_cron_job_renders_schedule_and_image() {
        let profile = EngineProfile::new(EngineKind::Postgres);
        let cron_job = backup_cron_job(&profile, "backups", &request("db1"));
        assert_eq!(cron_job.metadata.name.as_deref(), Some("backup-pg-db1"));
        assert_eq!(cron_job.metadata.namespace.as_deref(), Some("backups"));
        let spec = cron_job.spec.unwrap();
        assert_eq!(spec.schedule, "0 0 * * *");
        let pod = spec.job_template.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some(profile.backuper_image.as_str()));
    }

    #[test]
    fn apply_rendered_keeps_identity() {
        let profile = EngineProfile::new(EngineKind::Postgres);
        let mut existing = backup_cron_job(&profile, "backups", &request("db1"));
        existing.metadata.uid = Some("uid-7".to_string());

        let mut changed = request("db1");
        changed.schedule = "0 6 * * *".to_string();
        changed.max_backup_count = 5;
        apply_rendered(&mut existing, &backup_cron_job(&profile, "backups", &changed));

        assert_eq!(existing.metadata.uid.as_deref(), Some("uid-7"));
        let spec = existing.spec.unwrap();
        assert_eq!(spec.schedule, "0 6 * * *");
        let env = spec.job_template.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        assert!(env
            .iter()
            .any(|v| v.name == "MAX_BACKUP_COUNT" && v.value.as_deref() == Some("5")));
    }
}
